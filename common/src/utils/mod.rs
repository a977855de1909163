//! Utility functions and helpers.

pub mod sql;

// Re-export commonly used types
pub use sql::{contains_pattern, qualified_name, quote_ident, validate_identifier};
