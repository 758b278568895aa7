use std::{fmt, sync::Arc};

use sea_orm::{DatabaseConnection, DbErr, SqlErr};

use crate::{
    Argon2Hasher, EngineError, NoopNotifier, Notifier, Outbox, PaymentGateway, RandomTokenSource,
    ResultEngine, SecretHasher, TokenSource, UnconfiguredGateway,
};

mod accounts;
mod authorize;
mod cards;
mod funding;
mod tokens;
mod wallets;

pub use funding::TopUpOutcome;
pub use tokens::MAX_TOKEN_ATTEMPTS;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    hasher: Arc<dyn SecretHasher>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    outbox: Outbox,
    tokens: Arc<dyn TokenSource>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("outbox", &self.outbox)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Hash a password or PIN off the async runtime.
    async fn hash_secret(&self, plaintext: &str) -> ResultEngine<String> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|err| EngineError::Internal(format!("hashing task failed: {err}")))?
    }

    async fn verify_secret(&self, hash: String, plaintext: &str) -> ResultEngine<bool> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&hash, &plaintext))
            .await
            .map_err(|err| EngineError::Internal(format!("verification task failed: {err}")))?
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    hasher: Option<Arc<dyn SecretHasher>>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifier: Option<Arc<dyn Notifier>>,
    outbox: Option<Outbox>,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Hasher for passwords and PINs. Defaults to argon2id with default costs.
    pub fn hasher(mut self, hasher: Arc<dyn SecretHasher>) -> EngineBuilder {
        self.hasher = Some(hasher);
        self
    }

    /// Payment gateway used by top-ups. Without one every top-up fails.
    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> EngineBuilder {
        self.gateway = Some(gateway);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    pub fn outbox(mut self, outbox: Outbox) -> EngineBuilder {
        self.outbox = Some(outbox);
        self
    }

    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> EngineBuilder {
        self.tokens = Some(tokens);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            hasher: self
                .hasher
                .unwrap_or_else(|| Arc::new(Argon2Hasher::default())),
            gateway: self.gateway.unwrap_or_else(|| Arc::new(UnconfiguredGateway)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier)),
            outbox: self.outbox.unwrap_or_else(Outbox::disabled),
            tokens: self.tokens.unwrap_or_else(|| Arc::new(RandomTokenSource)),
        })
    }
}
