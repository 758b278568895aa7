//! The module contains the error the engine can throw.
//!
//! Every variant belongs to one [`ErrorKind`], which is what callers (the
//! HTTP server, the admin CLI) use to decide how to surface it:
//!
//! - [`TokenNotFound`] / [`AccountNotFound`] are `NotFound`.
//! - [`AlreadyRedeemed`] / [`DuplicateReference`] are `Conflict`.
//! - [`TransactionFailed`] wraps any store error; its details are never shown
//!   to end users.
//!
//!  [`TokenNotFound`]: EngineError::TokenNotFound
//!  [`AccountNotFound`]: EngineError::AccountNotFound
//!  [`AlreadyRedeemed`]: EngineError::AlreadyRedeemed
//!  [`DuplicateReference`]: EngineError::DuplicateReference
//!  [`TransactionFailed`]: EngineError::TransactionFailed
use sea_orm::DbErr;
use thiserror::Error;

/// Coarse classification of [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Unauthorized,
    Forbidden,
    Conflict,
    InsufficientFunds,
    ExternalServiceFailure,
    TransactionFailed,
    Internal,
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Account {0} not found")]
    AccountNotFound(String),
    #[error("{0} not yet registered")]
    NotRegistered(String),
    #[error("Wallet not found for account {0}")]
    WalletNotFound(String),
    #[error("Token {0} not found")]
    TokenNotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("{0}")]
    ExistingKey(String),
    #[error("Invalid authentication credentials")]
    InvalidCredentials,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Token {0} has already been redeemed")]
    AlreadyRedeemed(String),
    #[error("Token {0} is already bound to another receiver")]
    AlreadyBound(String),
    #[error("Token {0} changed while it was being authorized")]
    StaleToken(String),
    #[error("Attempt to reuse an already used transaction reference: {0}")]
    DuplicateReference(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Pin is invalid/incorrect")]
    InvalidPin,
    #[error("Pin has not been set for this account")]
    PinNotSet,
    #[error("Failed to verify transaction: {0}")]
    VerificationFailed(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Could not generate a unique token after {0} attempts")]
    ExhaustedRetries(u32),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] DbErr),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_)
            | Self::NotRegistered(_)
            | Self::WalletNotFound(_)
            | Self::TokenNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Validation(_) | Self::InvalidAmount(_) | Self::InvalidId(_) => {
                ErrorKind::Validation
            }
            Self::InvalidCredentials | Self::InvalidPin | Self::PinNotSet => {
                ErrorKind::Unauthorized
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ExistingKey(_)
            | Self::AlreadyRedeemed(_)
            | Self::AlreadyBound(_)
            | Self::StaleToken(_)
            | Self::DuplicateReference(_) => ErrorKind::Conflict,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::VerificationFailed(_) | Self::Gateway(_) => ErrorKind::ExternalServiceFailure,
            Self::TransactionFailed(_) => ErrorKind::TransactionFailed,
            Self::ExhaustedRetries(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AccountNotFound(a), Self::AccountNotFound(b)) => a == b,
            (Self::NotRegistered(a), Self::NotRegistered(b)) => a == b,
            (Self::WalletNotFound(a), Self::WalletNotFound(b)) => a == b,
            (Self::TokenNotFound(a), Self::TokenNotFound(b)) => a == b,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidCredentials, Self::InvalidCredentials) => true,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::AlreadyRedeemed(a), Self::AlreadyRedeemed(b)) => a == b,
            (Self::AlreadyBound(a), Self::AlreadyBound(b)) => a == b,
            (Self::StaleToken(a), Self::StaleToken(b)) => a == b,
            (Self::DuplicateReference(a), Self::DuplicateReference(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::InvalidPin, Self::InvalidPin) => true,
            (Self::PinNotSet, Self::PinNotSet) => true,
            (Self::VerificationFailed(a), Self::VerificationFailed(b)) => a == b,
            (Self::Gateway(a), Self::Gateway(b)) => a == b,
            (Self::ExhaustedRetries(a), Self::ExhaustedRetries(b)) => a == b,
            (Self::Internal(a), Self::Internal(b)) => a == b,
            (Self::TransactionFailed(a), Self::TransactionFailed(b)) => {
                a.to_string() == b.to_string()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_share_a_kind() {
        assert_eq!(
            EngineError::AlreadyRedeemed("T".to_string()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::DuplicateReference("ref".to_string()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::ExistingKey("a@b.com".to_string()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn store_errors_are_transaction_failures() {
        let err: EngineError = DbErr::Custom("boom".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    }

    #[test]
    fn pin_errors_are_distinct() {
        assert_ne!(EngineError::InvalidPin, EngineError::PinNotSet);
        assert_eq!(EngineError::PinNotSet.kind(), ErrorKind::Unauthorized);
    }
}
