use std::{sync::Arc, time::Duration};

use engine::{Argon2Hasher, Engine, LogTransport, Outbox, PaymentGateway, UnconfiguredGateway};
use migration::{Migrator, MigratorTrait};
use server::{ConnectionRegistry, InMemoryRateLimiter, JwtKeys, RateLimitSettings, ServerState};
use tracing_subscriber::EnvFilter;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pocketpay={level},server={level},engine={level},gateway={level}",
            level = settings.app.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = parse_database(&settings.database).await?;

    let (outbox, outbox_handle) = Outbox::start(
        Arc::new(LogTransport),
        settings.outbox.capacity,
        settings.outbox.workers,
    );
    let registry = Arc::new(ConnectionRegistry::new(settings.server.ws_buffer));
    let hasher = Argon2Hasher::with_params(
        settings.pin.memory_kib,
        settings.pin.iterations,
        settings.pin.parallelism,
    )?;

    let engine = Engine::builder()
        .database(db)
        .hasher(Arc::new(hasher))
        .gateway(payment_gateway(&settings.gateway)?)
        .notifier(registry.clone())
        .outbox(outbox)
        .build()
        .await?;

    let limiter = Arc::new(InMemoryRateLimiter::new(RateLimitSettings {
        per_second: settings.rate_limit.per_second,
        burst: settings.rate_limit.burst,
    }));
    let sweeper = limiter.clone().spawn_sweeper(
        Duration::from_secs(settings.rate_limit.sweep_interval_secs),
        Duration::from_secs(settings.rate_limit.idle_secs),
    );

    let state = ServerState::new(
        engine,
        JwtKeys::new(&settings.auth.jwt_secret, settings.auth.token_ttl_hours),
        registry,
        limiter,
    );

    let listener =
        tokio::net::TcpListener::bind((settings.server.bind.as_str(), settings.server.port))
            .await?;
    let served = server::run_with_listener(state, listener, shutdown_signal()).await;

    sweeper.abort();
    tracing::info!("draining outbox...");
    outbox_handle.shutdown().await;

    served?;
    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(&config.url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

fn payment_gateway(
    config: &settings::Gateway,
) -> Result<Arc<dyn PaymentGateway>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(secret_key) = &config.secret_key else {
        tracing::warn!("no gateway secret key configured, top-ups will fail");
        return Ok(Arc::new(UnconfiguredGateway));
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(Arc::new(gateway::PaystackClient::new(
        client,
        &config.base_url,
        secret_key,
    )))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
