//! Input validation stage: message hygiene checks plus pluggable validators.

mod middleware;
mod patterns;
mod validators;

pub use middleware::{InputValidationMiddleware, VALIDATION_PASSED_ITEM, VALIDATION_TIMESTAMP_ITEM};
pub use validators::{
    CommandInjectionValidator, HtmlContentValidator, InputValidationResult, InputValidator,
    LdapInjectionValidator, MessageSizeValidator, NoSqlInjectionValidator, PathTraversalValidator,
    SqlInjectionValidator, StringHygieneValidator,
};
