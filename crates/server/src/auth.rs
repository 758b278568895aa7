//! Bearer-token identity.
//!
//! Register and login hand out an HS256 JWT whose `sub` is the account id.
//! Every other route goes through [`require_bearer`], which turns a valid
//! token into an [`AccountId`] request extension.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

/// Authenticated caller, inserted by [`require_bearer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountId(pub Uuid);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Signing and verification keys plus token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").field("ttl", &self.ttl).finish()
    }
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, account_id: Uuid) -> Result<String, ServerError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|err| {
            tracing::error!("failed to sign token: {err}");
            ServerError::Generic("could not create session".to_string())
        })
    }

    pub fn verify(&self, token: &str) -> Result<AccountId, ServerError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|err| {
                tracing::debug!("rejected bearer token: {err}");
                ServerError::Unauthorized
            })?;
        Uuid::parse_str(&data.claims.sub)
            .map(AccountId)
            .map_err(|_| ServerError::Unauthorized)
    }
}

pub(crate) async fn require_bearer(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(ServerError::Unauthorized);
    };
    let account = state.keys.verify(bearer.token())?;

    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}
