//! Service error types.

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Coarse classification every caller-facing error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

/// Errors that can occur during marketplace operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Input failed validation before any write was attempted.
    #[error("{0}")]
    Validation(String),

    /// No caller identity was supplied.
    #[error("Authentication required")]
    Unauthorized,

    /// The caller is known but may not do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation lost a race or hit a state that no longer allows it.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A saga step failed; the whole unit of work was rolled back.
    #[error("Saga step '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: Box<SagaError>,
    },

    /// Domain error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SagaError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SagaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        SagaError::Forbidden(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        SagaError::Conflict(reason.into())
    }

    /// Wraps an error with the name of the saga step it came from.
    pub fn in_step(self, step: &'static str) -> Self {
        SagaError::StepFailed {
            step,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) => ErrorKind::Validation,
            SagaError::Unauthorized => ErrorKind::Unauthorized,
            SagaError::Forbidden(_) => ErrorKind::Forbidden,
            SagaError::NotFound { .. } => ErrorKind::NotFound,
            SagaError::Conflict(_) => ErrorKind::Conflict,
            SagaError::StepFailed { source, .. } => source.kind(),
            SagaError::Domain(err) => match err {
                DomainError::InvalidTransition { .. } | DomainError::AboveMaximumOrder { .. } => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Validation,
            },
            SagaError::Store(err) => match err {
                StoreError::Conflict(_) => ErrorKind::Conflict,
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                _ => ErrorKind::Internal,
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_split_into_validation_and_conflict() {
        let transition = SagaError::from(DomainError::InvalidTransition {
            entity: "bid",
            from: "accepted".to_string(),
            action: "withdraw",
        });
        assert_eq!(transition.kind(), ErrorKind::Conflict);

        let moq = SagaError::from(DomainError::BelowMinimumOrder {
            quantity: 1,
            minimum: 10,
        });
        assert_eq!(moq.kind(), ErrorKind::Validation);

        for err in [
            DomainError::AmountOverflow,
            DomainError::TooManyVariants {
                count: 100_000,
                max: 5_000,
            },
            DomainError::QuantityOverflow {
                current: 10,
                added: u32::MAX,
            },
        ] {
            assert_eq!(SagaError::from(err).kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn step_failures_keep_the_inner_kind() {
        let err = SagaError::from(StoreError::Conflict("bid moved".into())).in_step("accept_bid");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("accept_bid"));

        let err = SagaError::from(StoreError::Unavailable("down".into())).in_step("append_cart_line");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
