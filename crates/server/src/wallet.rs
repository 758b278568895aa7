//! Wallet balance and transfer history of the caller.

use api_types::{Envelope, payment::TokenView, wallet::WalletView};
use axum::{Extension, Json, extract::State};

use crate::{AccountId, ServerError, server::ServerState, views};

pub async fn get(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<WalletView>>, ServerError> {
    let wallet = state.engine.wallet(account_id).await?;

    Ok(Json(Envelope::ok("success", views::wallet(&wallet))))
}

/// Completed transfers, newest first.
pub async fn history(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<TokenView>>>, ServerError> {
    let transfers = state.engine.history(account_id).await?;

    Ok(Json(Envelope::ok(
        "success",
        transfers.into_iter().map(views::token).collect(),
    )))
}
