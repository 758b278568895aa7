//! Token-mediated wallet transfer engine.
//!
//! Accounts hold one wallet each. Money moves between wallets only through
//! single-use transfer tokens (`issue -> bind -> authorize`) and enters the
//! system only through reconciled gateway top-ups. Every balance mutation is
//! written in the same store transaction as the record that justifies it.

pub use accounts::Account;
pub use cards::{Card, NewCard};
pub use credentials::{Argon2Hasher, SecretHasher};
pub use error::{EngineError, ErrorKind};
pub use funding_references::FundingReference;
pub use gateway::{GatewayResult, PaymentGateway, UnconfiguredGateway, Verification};
pub use money::Money;
pub use notify::{NoopNotifier, NotificationEvent, Notifier};
pub use ops::{Engine, EngineBuilder, MAX_TOKEN_ATTEMPTS, TopUpOutcome};
pub use outbox::{LogTransport, MessageTransport, OutboundMessage, Outbox, OutboxHandle};
pub use transfer_tokens::{Party, RandomTokenSource, TokenSource, TokenStatus, TransferToken};
pub use wallets::Wallet;

mod accounts;
mod authorization_codes;
mod cards;
mod credentials;
mod error;
mod funding_references;
mod gateway;
mod money;
mod notify;
mod ops;
mod outbox;
mod pins;
mod transfer_tokens;
mod util;
mod wallets;

type ResultEngine<T> = Result<T, EngineError>;
