//! # Dispatch Testing Utils
//!
//! Shared testing utilities for the dispatch workspace: recording mocks of
//! the domain ports, test data builders, a Redis test container and a few
//! async helpers.
//!
//! ```toml
//! [dev-dependencies]
//! dispatch-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
