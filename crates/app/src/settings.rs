//! Handles settings for the application.
//!
//! Values come from an optional `settings.toml` in the working directory,
//! overridden by `POCKETPAY__<SECTION>__<KEY>` environment variables
//! (e.g. `POCKETPAY__AUTH__JWT_SECRET`). See `settings.toml` for the keys.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    /// Per-connection buffer of undelivered notifications.
    pub ws_buffer: usize,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct Gateway {
    pub base_url: String,
    /// Without a key every top-up fails with a gateway error.
    pub secret_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub per_second: u32,
    pub burst: u32,
    pub sweep_interval_secs: u64,
    pub idle_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Outbox {
    pub capacity: usize,
    pub workers: usize,
}

/// argon2id cost parameters for PIN and password hashes.
#[derive(Debug, Deserialize)]
pub struct Pin {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub gateway: Gateway,
    pub rate_limit: RateLimit,
    pub outbox: Outbox,
    pub pin: Pin,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Config::builder().add_source(File::with_name("settings").required(false)))
    }

    fn load(
        sources: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings = sources
            .add_source(
                Environment::with_prefix("POCKETPAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_default("app.level", "info")?
            .set_default("server.bind", "127.0.0.1")?
            .set_default("server.port", 2307)?
            .set_default("server.ws_buffer", 16)?
            .set_default("database.url", "sqlite:./pocketpay.db?mode=rwc")?
            .set_default("auth.token_ttl_hours", 24)?
            .set_default("gateway.base_url", gateway::DEFAULT_BASE_URL)?
            .set_default("gateway.timeout_secs", 10)?
            .set_default("rate_limit.per_second", 5)?
            .set_default("rate_limit.burst", 5)?
            .set_default("rate_limit.sweep_interval_secs", 60)?
            .set_default("rate_limit.idle_secs", 300)?
            .set_default("outbox.capacity", 64)?
            .set_default("outbox.workers", 2)?
            .set_default("pin.memory_kib", 19_456)?
            .set_default("pin.iterations", 2)?
            .set_default("pin.parallelism", 1)?
            .build()?;

        settings.try_deserialize()
    }
}
