use thiserror::Error;

use crate::models::TokenStatus;
use shared_models::AppError;
use shared_store::StoreError;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot has expired and is no longer accepting token requests")]
    SlotExpired,

    #[error("No tokens available for this slot")]
    SlotFull,

    #[error("Patient already holds token #{token_number} in this slot")]
    DuplicateActiveToken { token_number: u32 },

    #[error("Token not found")]
    TokenNotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TokenStatus, to: TokenStatus },

    #[error("No current token set. Please set a starting token.")]
    NoCurrentToken,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl TokenError {
    /// Only store unavailability is worth automatic retry; every other kind
    /// is terminal for the request that hit it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TokenError::StoreUnavailable(_))
    }
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => TokenError::StoreUnavailable(msg),
            other => TokenError::DatabaseError(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SlotNotFound | TokenError::TokenNotFound => {
                AppError::NotFound(err.to_string())
            }
            TokenError::SlotExpired => AppError::Gone(err.to_string()),
            TokenError::SlotFull
            | TokenError::DuplicateActiveToken { .. }
            | TokenError::InvalidTransition { .. }
            | TokenError::NoCurrentToken => AppError::Conflict(err.to_string()),
            TokenError::StoreUnavailable(_) => AppError::Unavailable(err.to_string()),
            TokenError::InvariantViolation(_) | TokenError::DatabaseError(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
