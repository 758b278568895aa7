//! Cards on file for the caller.

use api_types::{Envelope, card::CardView};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::extract::WithRejection;
use engine::NewCard;

use crate::{AccountId, ServerError, server::ServerState, views};

pub async fn add(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<api_types::card::NewCard>, ServerError>,
) -> Result<(StatusCode, Json<Envelope<CardView>>), ServerError> {
    let card = NewCard {
        number: payload.card_no,
        cvv: payload.cvv,
        expiry_month: payload.expiry_month,
        expiry_year: payload.expiry_year,
    };
    let card = state.engine.add_card(account_id, &card).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("Card added", views::card(card))),
    ))
}

pub async fn list(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<CardView>>>, ServerError> {
    let cards = state.engine.cards(account_id).await?;

    Ok(Json(Envelope::ok(
        "success",
        cards.into_iter().map(views::card).collect(),
    )))
}
