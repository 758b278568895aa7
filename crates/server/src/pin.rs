use api_types::{Envelope, pin::Pin};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;

use crate::{AccountId, ServerError, server::ServerState};

pub async fn set(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Pin>, ServerError>,
) -> Result<Json<Envelope<()>>, ServerError> {
    state.engine.set_pin(account_id, &payload.pin).await?;

    Ok(Json(Envelope::done("Pin created")))
}

pub async fn verify(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Pin>, ServerError>,
) -> Result<Json<Envelope<()>>, ServerError> {
    state.engine.verify_pin(account_id, &payload.pin).await?;

    Ok(Json(Envelope::done("success")))
}
