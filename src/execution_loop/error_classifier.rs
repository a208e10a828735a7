//! Error Classifier
//!
//! Splits store failures into errors the statement itself caused (worth a
//! correction), transient infrastructure errors, and failures to read a result
//! back. Only the first kind spends repair budget.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Syntax, missing relation/column, type mismatch, constraint violation
    Statement,
    /// Connection loss, pool exhaustion, cancellation, server shutdown
    Transient,
    /// The statement ran; its rows could not be converted
    Decode,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Statement => write!(f, "Statement"),
            ErrorClass::Transient => write!(f, "Transient"),
            ErrorClass::Decode => write!(f, "Decode"),
        }
    }
}

pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &sqlx::Error) -> ErrorClass {
        match error {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .map(|code| self.classify_sqlstate(&code))
                .unwrap_or(ErrorClass::Statement),
            sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_) => ErrorClass::Decode,
            _ => ErrorClass::Transient,
        }
    }

    /// Classify by SQLSTATE. Class 08 (connection), 53 (resources), 57
    /// (operator intervention, incl. cancellation) and 40001/40P01
    /// (serialization, deadlock) are transient; everything else is on the
    /// statement.
    pub fn classify_sqlstate(&self, code: &str) -> ErrorClass {
        if code.starts_with("08")
            || code.starts_with("53")
            || code.starts_with("57")
            || code == "40001"
            || code == "40P01"
        {
            ErrorClass::Transient
        } else {
            ErrorClass::Statement
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_syntax_error() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify_sqlstate("42601"), ErrorClass::Statement);
        assert_eq!(classifier.classify_sqlstate("42703"), ErrorClass::Statement);
        assert_eq!(classifier.classify_sqlstate("23505"), ErrorClass::Statement);
    }

    #[test]
    fn test_classify_transient() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify_sqlstate("08006"), ErrorClass::Transient);
        assert_eq!(classifier.classify_sqlstate("57014"), ErrorClass::Transient);
        assert_eq!(classifier.classify_sqlstate("40P01"), ErrorClass::Transient);
        assert_eq!(classifier.classify(&sqlx::Error::PoolTimedOut), ErrorClass::Transient);
    }

    #[test]
    fn test_decode_failures_are_not_the_statements_fault() {
        let classifier = ErrorClassifier::new();
        let decode = sqlx::Error::ColumnDecode {
            index: "0".to_string(),
            source: "mismatched types".into(),
        };
        assert_eq!(classifier.classify(&decode), ErrorClass::Decode);
        assert_eq!(
            classifier.classify(&sqlx::Error::Decode("bad utf-8".into())),
            ErrorClass::Decode
        );
        assert_eq!(classifier.classify(&sqlx::Error::RowNotFound), ErrorClass::Decode);
    }
}
