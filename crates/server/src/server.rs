use std::{future::Future, sync::Arc};

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    auth::{JwtKeys, require_bearer},
    card, payment, pin,
    ratelimit::{RateLimiter, limit_by_credential},
    topup, user, wallet,
    ws::{self, ConnectionRegistry},
};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub keys: Arc<JwtKeys>,
    pub registry: Arc<ConnectionRegistry>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl ServerState {
    /// `registry` should be the same instance the engine notifies through,
    /// otherwise sockets never see any event.
    pub fn new(
        engine: Engine,
        keys: JwtKeys,
        registry: Arc<ConnectionRegistry>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            keys: Arc::new(keys),
            registry,
            limiter,
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let protected = Router::new()
        .route("/api/txn/init", post(topup::init))
        .route("/api/txn/verify/{reference}", get(topup::verify))
        .route("/api/me/pin/new", post(pin::set))
        .route("/api/me/pin/verify", post(pin::verify))
        .route("/api/me/payment/init", get(payment::issue))
        .route("/api/payment/recv", post(payment::redeem))
        .route(
            "/api/payment/authorize",
            post(payment::authorize).route_layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                limit_by_credential,
            )),
        )
        .route("/api/payment/token/{token}", get(payment::token))
        .route("/api/me/txn/history", get(wallet::history))
        .route("/api/me/wallet", get(wallet::get))
        .route("/api/card/new", post(card::add))
        .route("/api/me/cards", get(card::list))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/api/user/new", post(user::register))
        .route("/api/user/login", post(user::login))
        .route("/ws/connect", get(ws::connect))
        .merge(protected)
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn run_with_listener<F>(
    state: ServerState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener, std::future::pending()).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
