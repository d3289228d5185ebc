use std::fmt;

use thiserror::Error;

/// SQLSTATE reported by PostgreSQL for a unique constraint violation.
pub const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE reported by PostgreSQL for a foreign key violation.
pub const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Kind of integrity constraint the engine rejected a statement for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
}

impl ConstraintKind {
    /// Maps a SQLSTATE to the constraint kind it reports, if any.
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            SQLSTATE_UNIQUE_VIOLATION => Some(ConstraintKind::Unique),
            SQLSTATE_FOREIGN_KEY_VIOLATION => Some(ConstraintKind::ForeignKey),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Unique => f.write_str("unique"),
            ConstraintKind::ForeignKey => f.write_str("foreign key"),
        }
    }
}

/// Error type for pgdao operations
#[derive(Debug, Error)]
pub enum DaoError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Query failed: {message}")]
    QueryFailed {
        /// SQLSTATE, when the error came from the engine.
        code: Option<String>,
        /// Constraint the engine named in its report.
        constraint: Option<String>,
        message: String,
    },

    #[error("{kind} constraint violation: {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint: Option<String>,
        message: String,
    },

    #[error("Cannot cast column {column} from {found} to {expected}")]
    Cast {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Unsupported type {type_name} in column {column}")]
    UnsupportedType { column: String, type_name: String },
}

impl DaoError {
    /// Builds a query error without an engine code.
    pub fn query(message: impl Into<String>) -> Self {
        DaoError::QueryFailed {
            code: None,
            constraint: None,
            message: message.into(),
        }
    }

    /// Translates an engine error carrying a constraint SQLSTATE into
    /// `ConstraintViolation`. Every other error is returned unchanged.
    pub fn into_constraint_violation(self) -> Self {
        match self {
            DaoError::QueryFailed {
                code: Some(code),
                constraint,
                message,
            } => match ConstraintKind::from_sqlstate(&code) {
                Some(kind) => DaoError::ConstraintViolation {
                    kind,
                    constraint,
                    message,
                },
                None => DaoError::QueryFailed {
                    code: Some(code),
                    constraint,
                    message,
                },
            },
            other => other,
        }
    }

    /// Returns the SQLSTATE of an engine error, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            DaoError::QueryFailed { code, .. } => code.as_deref(),
            DaoError::ConstraintViolation { kind, .. } => Some(match kind {
                ConstraintKind::Unique => SQLSTATE_UNIQUE_VIOLATION,
                ConstraintKind::ForeignKey => SQLSTATE_FOREIGN_KEY_VIOLATION,
            }),
            _ => None,
        }
    }
}

/// Result type alias for pgdao operations
pub type Result<T> = std::result::Result<T, DaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_error(code: &str, constraint: Option<&str>) -> DaoError {
        DaoError::QueryFailed {
            code: Some(code.to_string()),
            constraint: constraint.map(str::to_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_unique_violation_is_translated() {
        let err = engine_error("23505", Some("users_email_key")).into_constraint_violation();
        match err {
            DaoError::ConstraintViolation {
                kind, constraint, ..
            } => {
                assert_eq!(kind, ConstraintKind::Unique);
                assert_eq!(constraint.as_deref(), Some("users_email_key"));
            }
            other => panic!("Expected ConstraintViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_key_violation_is_translated() {
        let err = engine_error("23503", None).into_constraint_violation();
        assert!(matches!(
            err,
            DaoError::ConstraintViolation {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        ));
        assert_eq!(err.sqlstate(), Some("23503"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        // not_null_violation is an integrity error but not one we translate
        let err = engine_error("23502", None).into_constraint_violation();
        assert!(matches!(err, DaoError::QueryFailed { .. }));
        assert_eq!(err.sqlstate(), Some("23502"));

        let err = DaoError::query("syntax").into_constraint_violation();
        assert!(matches!(err, DaoError::QueryFailed { code: None, .. }));
    }
}
