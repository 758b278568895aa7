//! Account registration and login. These are the only API routes reachable
//! without a bearer token.

use api_types::{
    Envelope,
    user::{Login, Register, Session},
};
use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::WithRejection;

use crate::{ServerError, server::ServerState, views};

pub async fn register(
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Register>, ServerError>,
) -> Result<(StatusCode, Json<Envelope<Session>>), ServerError> {
    let account = state
        .engine
        .register(&payload.email, &payload.fullname, &payload.password)
        .await?;
    let token = state.keys.issue(account.id)?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(
            "success",
            Session {
                account: views::account(&account),
                token,
            },
        )),
    ))
}

pub async fn login(
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Login>, ServerError>,
) -> Result<Json<Envelope<Session>>, ServerError> {
    let account = state
        .engine
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = state.keys.issue(account.id)?;
    tracing::info!(account_id = %account.id, "login");

    Ok(Json(Envelope::ok(
        "success",
        Session {
            account: views::account(&account),
            token,
        },
    )))
}
