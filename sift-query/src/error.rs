//! Error types for filter parsing, compilation and paging.
//!
//! Every failure is a caller-input error: it is surfaced immediately with
//! enough context (the offending field, operator or parameter) for the
//! caller to correct the request, and it is never retried.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: F{category}{number}
//! - 1xxx: Filter errors (field, operator, value, range, combinator)
//! - 2xxx: Sorting errors
//! - 3xxx: Paging errors
//! - 7xxx: Configuration errors
//!
//! ```rust
//! use sift_query::{ErrorCode, FilterError};
//!
//! let err = FilterError::invalid_field("secret_field", "is not filterable");
//! assert_eq!(err.code(), ErrorCode::InvalidField);
//! assert_eq!(err.code().code(), "F1001");
//! assert_eq!(err.field(), Some("secret_field"));
//! ```

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Filter errors (1xxx)
    /// Field is not registered or not permitted (F1001).
    InvalidField = 1001,
    /// Operator is unknown or not applicable to the field (F1002).
    InvalidOperator = 1002,
    /// Malformed range (F1003).
    InvalidRange = 1003,
    /// Combinator with too few children (F1004).
    InvalidCombinatorArity = 1004,
    /// Value has the wrong shape or type (F1005).
    InvalidValue = 1005,
    /// Filter is structurally malformed (F1006).
    InvalidFilter = 1006,

    // Sorting errors (2xxx)
    /// Sort direction outside asc/desc (F2001).
    InvalidDirection = 2001,

    // Paging errors (3xxx)
    /// Paging parameters are non-numeric or ambiguous (F3001).
    InvalidPaging = 3001,

    // Configuration errors (7xxx)
    /// Registry configuration is invalid (F7001).
    InvalidConfiguration = 7001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "F1001").
    pub fn code(&self) -> String {
        format!("F{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidField => "Invalid field",
            Self::InvalidOperator => "Invalid operator",
            Self::InvalidRange => "Invalid range",
            Self::InvalidCombinatorArity => "Invalid combinator arity",
            Self::InvalidValue => "Invalid value",
            Self::InvalidFilter => "Invalid filter",
            Self::InvalidDirection => "Invalid sort direction",
            Self::InvalidPaging => "Invalid paging",
            Self::InvalidConfiguration => "Invalid configuration",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while turning caller input into a query plan.
#[derive(Error, Debug, Diagnostic)]
pub enum FilterError {
    /// Field is not in the registry, or not permitted for the operation.
    #[error("invalid field `{field}`: {reason}")]
    #[diagnostic(code(sift::filter::invalid_field))]
    InvalidField { field: String, reason: String },

    /// Operator is not recognised, or not applicable to the field.
    #[error("invalid operator `{operator}` for field `{field}`: {reason}")]
    #[diagnostic(code(sift::filter::invalid_operator))]
    InvalidOperator {
        field: String,
        operator: String,
        reason: String,
    },

    /// Malformed interval string, or both/neither range forms given.
    #[error("invalid range for field `{field}`: {message}")]
    #[diagnostic(
        code(sift::filter::invalid_range),
        help("use either {{\"from\": a, \"to\": b}} or {{\"interval\": \"[a,b)\"}}")
    )]
    InvalidRange { field: String, message: String },

    /// `and`/`or` with fewer than two children, or an empty `not`.
    #[error("`{combinator}` requires at least {required} condition(s), got {count}")]
    #[diagnostic(code(sift::filter::invalid_combinator_arity))]
    InvalidCombinatorArity {
        combinator: String,
        required: usize,
        count: usize,
    },

    /// Value has the wrong shape or cannot be coerced to the field's type.
    #[error("invalid value for `{field}` `{operator}`: {message}")]
    #[diagnostic(code(sift::filter::invalid_value))]
    InvalidValue {
        field: String,
        operator: String,
        message: String,
    },

    /// Filter is structurally malformed.
    #[error("invalid filter: {message}")]
    #[diagnostic(code(sift::filter::invalid_filter))]
    InvalidFilter { message: String },

    /// Sort direction is not `asc` or `desc`.
    #[error("invalid sort direction `{direction}`, expected `asc` or `desc`")]
    #[diagnostic(code(sift::sort::invalid_direction))]
    InvalidDirection { direction: String },

    /// Paging parameter is non-numeric or the combination is ambiguous.
    #[error("invalid paging parameter `{parameter}`: {message}")]
    #[diagnostic(code(sift::paging::invalid_paging))]
    InvalidPaging { parameter: String, message: String },

    /// Registry configuration could not be loaded.
    #[error("configuration error: {message}")]
    #[diagnostic(code(sift::config::invalid))]
    Config { message: String },

    /// Registry TOML could not be parsed.
    #[error("failed to parse registry TOML")]
    #[diagnostic(code(sift::config::toml_error))]
    Toml {
        #[source]
        source: toml::de::Error,
    },

    /// Registry file could not be read.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(sift::config::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid operator error.
    pub fn invalid_operator(
        field: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOperator {
            field: field.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRange {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a combinator arity error.
    pub fn arity(combinator: impl Into<String>, required: usize, count: usize) -> Self {
        Self::InvalidCombinatorArity {
            combinator: combinator.into(),
            required,
            count,
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        field: impl Into<String>,
        operator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            operator: operator.into(),
            message: message.into(),
        }
    }

    /// Create a structural filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Create an invalid direction error.
    pub fn invalid_direction(direction: impl Into<String>) -> Self {
        Self::InvalidDirection {
            direction: direction.into(),
        }
    }

    /// Create an invalid paging error.
    pub fn invalid_paging(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPaging {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidField { .. } => ErrorCode::InvalidField,
            Self::InvalidOperator { .. } => ErrorCode::InvalidOperator,
            Self::InvalidRange { .. } => ErrorCode::InvalidRange,
            Self::InvalidCombinatorArity { .. } => ErrorCode::InvalidCombinatorArity,
            Self::InvalidValue { .. } => ErrorCode::InvalidValue,
            Self::InvalidFilter { .. } => ErrorCode::InvalidFilter,
            Self::InvalidDirection { .. } => ErrorCode::InvalidDirection,
            Self::InvalidPaging { .. } => ErrorCode::InvalidPaging,
            Self::Config { .. } | Self::Toml { .. } | Self::Io { .. } => {
                ErrorCode::InvalidConfiguration
            }
        }
    }

    /// The offending field, if the error concerns one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidField { field, .. }
            | Self::InvalidOperator { field, .. }
            | Self::InvalidRange { field, .. }
            | Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }

    /// The offending operator, if the error concerns one.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::InvalidOperator { operator, .. } | Self::InvalidValue { operator, .. } => {
                Some(operator)
            }
            Self::InvalidCombinatorArity { combinator, .. } => Some(combinator),
            _ => None,
        }
    }

    /// Whether the error stems from caller input (as opposed to configuration).
    pub fn is_client_error(&self) -> bool {
        self.code() != ErrorCode::InvalidConfiguration
    }
}

#[cfg(test)]
#[allow(unused_assignments)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::InvalidField.code(), "F1001");
        assert_eq!(ErrorCode::InvalidDirection.code(), "F2001");
        assert_eq!(ErrorCode::InvalidPaging.to_string(), "F3001");
    }

    #[test]
    fn test_invalid_field_message() {
        let err = FilterError::invalid_field("secret_field", "is not filterable");
        assert_eq!(err.to_string(), "invalid field `secret_field`: is not filterable");
        assert_eq!(err.field(), Some("secret_field"));
        assert!(err.operator().is_none());
    }

    #[test]
    fn test_invalid_operator_context() {
        let err = FilterError::invalid_operator("name", "gteq", "not allowed");
        assert_eq!(err.code(), ErrorCode::InvalidOperator);
        assert_eq!(err.field(), Some("name"));
        assert_eq!(err.operator(), Some("gteq"));
    }

    #[test]
    fn test_arity_message() {
        let err = FilterError::arity("and", 2, 1);
        assert_eq!(err.to_string(), "`and` requires at least 2 condition(s), got 1");
        assert_eq!(err.code(), ErrorCode::InvalidCombinatorArity);
    }

    #[test]
    fn test_client_errors() {
        assert!(FilterError::invalid_direction("up").is_client_error());
        assert!(!FilterError::config("missing table").is_client_error());
    }

    #[test]
    fn test_diagnostic_code() {
        let err = FilterError::invalid_range("duration", "bad interval");
        let code = err.code().description();
        assert_eq!(code, "Invalid range");
        let diag = Diagnostic::code(&err).map(|c| c.to_string());
        assert_eq!(diag.as_deref(), Some("sift::filter::invalid_range"));
    }
}
