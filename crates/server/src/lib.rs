use api_types::Envelope;
use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use engine::{EngineError, ErrorKind};

pub use auth::{AccountId, JwtKeys};
pub use ratelimit::{InMemoryRateLimiter, RateLimitSettings, RateLimiter};
pub use server::{ServerState, router, run_with_listener, spawn_with_listener};
pub use ws::ConnectionRegistry;

mod auth;
mod card;
mod payment;
mod pin;
mod ratelimit;
mod server;
mod topup;
mod user;
mod views;
mod wallet;
mod ws;

pub mod types {
    pub use api_types::Envelope;

    pub mod user {
        pub use api_types::user::{AccountView, Login, Register, Session};
    }

    pub mod payment {
        pub use api_types::payment::{Authorize, PartyView, Redeem, TokenStatus, TokenView};
    }

    pub mod topup {
        pub use api_types::topup::{AccessCode, TopUpInit, TopUpResult};
    }

    pub mod wallet {
        pub use api_types::wallet::WalletView;
    }

    pub mod card {
        pub use api_types::card::{CardView, NewCard};
    }

    pub mod pin {
        pub use api_types::pin::Pin;
    }
}

#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    Unauthorized,
    TooManyRequests,
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation | ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternalServiceFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::TransactionFailed | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err.kind() {
        ErrorKind::TransactionFailed | ErrorKind::Internal => {
            tracing::error!("engine error: {err}");
            "internal server error".to_string()
        }
        ErrorKind::ExternalServiceFailure => {
            tracing::warn!("external service error: {err}");
            "Payment provider is unavailable at this time. Please, retry".to_string()
        }
        _ => err.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ServerError::Engine(err) => {
                (status_for_engine_error(&err), message_for_engine_error(err))
            }
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "UnAuthorized".to_string()),
            ServerError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, slow down".to_string(),
            ),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Envelope::<()>::fail(message))).into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(value: JsonRejection) -> Self {
        tracing::debug!("rejected request body: {value}");
        Self::Generic("Invalid request".to_string())
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
