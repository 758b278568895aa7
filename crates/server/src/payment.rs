//! Token transfer endpoints.
//!
//! The sender issues a token and hands it over out of band, the receiver
//! binds it to an amount with `recv`, and the sender confirms with `authorize`
//! and their PIN.

use api_types::{
    Envelope,
    payment::{Authorize, Redeem, TokenView},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use engine::Money;

use crate::{AccountId, ServerError, server::ServerState, views};

pub async fn issue(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<Envelope<TokenView>>), ServerError> {
    let token = state.engine.issue_token(account_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("success", views::token(token))),
    ))
}

pub async fn redeem(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Redeem>, ServerError>,
) -> Result<Json<Envelope<TokenView>>, ServerError> {
    let amount: Money = payload.amount.parse()?;
    let token = state
        .engine
        .bind_token(&payload.token, account_id, amount)
        .await?;

    Ok(Json(Envelope::ok("success", views::token(token))))
}

pub async fn authorize(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Authorize>, ServerError>,
) -> Result<Json<Envelope<TokenView>>, ServerError> {
    let token = state
        .engine
        .authorize(account_id, &payload.token, &payload.pin)
        .await?;

    Ok(Json(Envelope::ok("success", views::token(token))))
}

pub async fn token(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> Result<Json<Envelope<TokenView>>, ServerError> {
    let token = state.engine.token_for(account_id, &token).await?;

    Ok(Json(Envelope::ok("success", views::token(token))))
}
