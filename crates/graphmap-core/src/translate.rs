//! Driver failure → [`RepositoryError`] classification.
//!
//! The structured server code is authoritative. When a driver surfaces a
//! failure without one (connection-level wrappers, older protocol paths),
//! the raw message is matched against known fragments instead.

use crate::error::{DriverError, RepositoryError};

/// Classification bucket for a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    ConstraintViolation,
    Transient,
    Unauthorized,
    Other,
}

const CONSTRAINT_FRAGMENTS: &[&str] = &[
    "constraintvalidationfailed",
    "already exists with label",
    "constraint violation",
    "must have the property",
];

const TRANSIENT_FRAGMENTS: &[&str] = &[
    "transienterror",
    "deadlock",
    "lock client stopped",
    "database unavailable",
    "leader switch",
    "not a leader",
];

const UNAUTHORIZED_FRAGMENTS: &[&str] = &[
    "unauthorized",
    "authentication failure",
    "authenticationerror",
    "forbidden",
    "credentials expired",
];

/// Classify by structured status code (`Neo.<Classification>.<Category>.<Title>`).
pub fn classify_code(code: &str) -> FailureClass {
    let mut parts = code.split('.');
    let _ = parts.next();
    let classification = parts.next().unwrap_or_default();
    let category = parts.next().unwrap_or_default();
    let title = parts.next().unwrap_or_default();

    if classification == "TransientError" {
        return FailureClass::Transient;
    }
    if category == "Security" {
        return FailureClass::Unauthorized;
    }
    if category == "Schema" && title.starts_with("Constraint") {
        return FailureClass::ConstraintViolation;
    }
    FailureClass::Other
}

/// Classify by substring matching on the raw message.
pub fn classify_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if CONSTRAINT_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        FailureClass::ConstraintViolation
    } else if TRANSIENT_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        FailureClass::Transient
    } else if UNAUTHORIZED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        FailureClass::Unauthorized
    } else {
        FailureClass::Other
    }
}

pub fn classify(error: &DriverError) -> FailureClass {
    match error.code.as_deref() {
        Some(code) if !code.is_empty() => classify_code(code),
        _ => classify_message(&error.message),
    }
}

/// Translate a driver failure raised while running `context`.
pub fn translate(context: &str, error: DriverError) -> RepositoryError {
    let context = context.to_string();
    match classify(&error) {
        FailureClass::ConstraintViolation => RepositoryError::ConstraintViolation {
            context,
            source: error,
        },
        FailureClass::Transient => RepositoryError::Transient {
            context,
            source: error,
        },
        FailureClass::Unauthorized => RepositoryError::Unauthorized {
            context,
            source: error,
        },
        FailureClass::Other => RepositoryError::Repository {
            context,
            message: error.message.clone(),
            source: Some(Box::new(error)),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_structured_codes() {
        assert_eq!(
            classify_code("Neo.ClientError.Schema.ConstraintValidationFailed"),
            FailureClass::ConstraintViolation
        );
        assert_eq!(
            classify_code("Neo.TransientError.Transaction.DeadlockDetected"),
            FailureClass::Transient
        );
        assert_eq!(
            classify_code("Neo.ClientError.Security.Unauthorized"),
            FailureClass::Unauthorized
        );
        assert_eq!(
            classify_code("Neo.ClientError.Statement.SyntaxError"),
            FailureClass::Other
        );
        assert_eq!(
            classify_code("Neo.ClientError.Statement.ParameterMissing"),
            FailureClass::Other
        );
    }

    #[test]
    fn test_code_wins_over_message() {
        let err = DriverError::with_code(
            "Neo.ClientError.Statement.SyntaxError",
            "deadlock in the word list",
        );
        assert!(matches!(
            translate("query", err),
            RepositoryError::Repository { .. }
        ));
    }

    #[test]
    fn test_message_fallback() {
        let err = DriverError::new("Node(12) already exists with label `Person` and property `id`");
        assert!(matches!(
            translate("create Person", err),
            RepositoryError::ConstraintViolation { .. }
        ));

        let err = DriverError::new("The client is unauthorized due to authentication failure.");
        assert!(matches!(
            translate("connect", err),
            RepositoryError::Unauthorized { .. }
        ));

        let err = DriverError::new("ForsetiClient can't acquire lock: Deadlock detected");
        let translated = translate("update", err);
        assert!(translated.is_retryable());
    }

    #[test]
    fn test_cause_and_context_preserved() {
        let err = DriverError::with_code("Neo.TransientError.General.DatabaseUnavailable", "down");
        let translated = translate("findById Person", err);
        assert_eq!(translated.context(), "findById Person");
        let cause = translated.source().expect("cause kept");
        assert_eq!(cause.to_string(), "down");
    }
}
