use super::patterns::{
    COMMAND_INJECTION, HTML_CONTENT, LDAP_INJECTION, NOSQL_INJECTION, PATH_TRAVERSAL,
    SQL_INJECTION,
};
use async_trait::async_trait;
use dispatch_domain::{DispatchMessage, MessageContext};
use dispatch_errors::DispatchResult;
use regex::Regex;
use serde_json::Value;

/// Outcome of one validator; an empty error list means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputValidationResult {
    errors: Vec<String>,
}

impl InputValidationResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// Pluggable message validator. Returning `Err` is a validator fault, not a
/// validation failure; the middleware decides how to treat it.
#[async_trait]
pub trait InputValidator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(
        &self,
        message: &dyn DispatchMessage,
        context: &MessageContext,
    ) -> DispatchResult<InputValidationResult>;
}

/// Collects every string in the payload, object keys included, with its JSON path.
fn collect_strings<'v>(value: &'v Value, path: String, out: &mut Vec<(String, &'v str)>) {
    match value {
        Value::String(s) => out.push((path, s.as_str())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_strings(item, format!("{path}[{index}]"), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                out.push((child.clone(), key.as_str()));
                collect_strings(item, child, out);
            }
        }
        _ => {}
    }
}

fn depth_of(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth_of).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth_of).max().unwrap_or(0),
        _ => 0,
    }
}

fn field_label(path: &str) -> &str {
    if path.is_empty() {
        "message"
    } else {
        path
    }
}

fn scan_patterns(
    message: &dyn DispatchMessage,
    patterns: &[Regex],
    threat: &str,
) -> DispatchResult<InputValidationResult> {
    let value = message.to_value()?;
    let mut strings = Vec::new();
    collect_strings(&value, String::new(), &mut strings);

    let errors: Vec<String> = strings
        .into_iter()
        .filter(|(_, s)| patterns.iter().any(|p| p.is_match(s)))
        .map(|(path, _)| format!("Potential {threat} detected in field '{}'", field_label(&path)))
        .collect();

    Ok(InputValidationResult { errors })
}

macro_rules! pattern_validator {
    ($(#[$meta:meta])* $name:ident, $label:literal, $patterns:ident, $threat:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        #[async_trait]
        impl InputValidator for $name {
            fn name(&self) -> &str {
                $label
            }

            async fn validate(
                &self,
                message: &dyn DispatchMessage,
                _context: &MessageContext,
            ) -> DispatchResult<InputValidationResult> {
                scan_patterns(message, &$patterns, $threat)
            }
        }
    };
}

pattern_validator!(SqlInjectionValidator, "sql-injection", SQL_INJECTION, "SQL injection");
pattern_validator!(
    NoSqlInjectionValidator,
    "nosql-injection",
    NOSQL_INJECTION,
    "NoSQL injection"
);
pattern_validator!(
    CommandInjectionValidator,
    "command-injection",
    COMMAND_INJECTION,
    "command injection"
);
pattern_validator!(
    PathTraversalValidator,
    "path-traversal",
    PATH_TRAVERSAL,
    "path traversal"
);
pattern_validator!(
    LdapInjectionValidator,
    "ldap-injection",
    LDAP_INJECTION,
    "LDAP injection"
);
pattern_validator!(
    /// Rejects script tags, inline event handlers and HTML markup (XSS).
    HtmlContentValidator,
    "html-content",
    HTML_CONTENT,
    "HTML content"
);

/// Per-string limits: length, null bytes, control characters.
#[derive(Debug, Clone)]
pub struct StringHygieneValidator {
    pub max_string_length: usize,
    pub allow_null_bytes: bool,
    pub allow_control_characters: bool,
}

impl StringHygieneValidator {
    pub fn new(max_string_length: usize) -> Self {
        Self {
            max_string_length,
            allow_null_bytes: false,
            allow_control_characters: false,
        }
    }
}

#[async_trait]
impl InputValidator for StringHygieneValidator {
    fn name(&self) -> &str {
        "string-hygiene"
    }

    async fn validate(
        &self,
        message: &dyn DispatchMessage,
        _context: &MessageContext,
    ) -> DispatchResult<InputValidationResult> {
        let value = message.to_value()?;
        let mut strings = Vec::new();
        collect_strings(&value, String::new(), &mut strings);

        let mut errors = Vec::new();
        for (path, s) in strings {
            let field = field_label(&path);
            if s.chars().count() > self.max_string_length {
                errors.push(format!(
                    "Field '{field}' exceeds maximum length of {}",
                    self.max_string_length
                ));
            }
            if !self.allow_null_bytes && s.contains('\0') {
                errors.push(format!("Field '{field}' contains null bytes"));
            }
            if !self.allow_control_characters
                && s
                    .chars()
                    .any(|c| c.is_control() && c != '\0' && !matches!(c, '\t' | '\n' | '\r'))
            {
                errors.push(format!("Field '{field}' contains control characters"));
            }
        }
        Ok(InputValidationResult { errors })
    }
}

/// Serialized size and nesting depth limits.
#[derive(Debug, Clone)]
pub struct MessageSizeValidator {
    pub max_message_size_bytes: usize,
    pub max_object_depth: usize,
}

#[async_trait]
impl InputValidator for MessageSizeValidator {
    fn name(&self) -> &str {
        "message-size"
    }

    async fn validate(
        &self,
        message: &dyn DispatchMessage,
        _context: &MessageContext,
    ) -> DispatchResult<InputValidationResult> {
        let value = message.to_value()?;
        let mut errors = Vec::new();

        let size = serde_json::to_vec(&value)?.len();
        if size > self.max_message_size_bytes {
            errors.push(format!(
                "Message size {size} bytes exceeds maximum of {} bytes",
                self.max_message_size_bytes
            ));
        }
        let depth = depth_of(&value);
        if depth > self.max_object_depth {
            errors.push(format!(
                "Message nesting depth {depth} exceeds maximum of {}",
                self.max_object_depth
            ));
        }
        Ok(InputValidationResult { errors })
    }
}
