//! Wallet funding through the payment gateway.
//!
//! The client starts a charge with `init`, pays on the provider's page, then
//! calls `verify` with the provider reference. Only `verify` moves money.

use api_types::{
    Envelope,
    topup::{AccessCode, TopUpInit, TopUpResult},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;
use engine::{Money, TopUpOutcome};

use crate::{AccountId, ServerError, server::ServerState};

pub async fn init(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TopUpInit>, ServerError>,
) -> Result<Json<Envelope<AccessCode>>, ServerError> {
    let amount: Money = payload.amount.parse()?;
    let access_code = state.engine.init_top_up(account_id, amount).await?;

    Ok(Json(Envelope::ok("success", AccessCode { access_code })))
}

pub async fn verify(
    Extension(AccountId(account_id)): Extension<AccountId>,
    State(state): State<ServerState>,
    Path(reference): Path<String>,
) -> Result<Json<Envelope<TopUpResult>>, ServerError> {
    let outcome = state.engine.reconcile_top_up(&reference, account_id).await?;

    let envelope = match outcome {
        TopUpOutcome::Credited { amount } => Envelope::ok(
            "Transaction verification successful",
            TopUpResult::Credited {
                amount: amount.to_string(),
            },
        ),
        TopUpOutcome::Pending { status } => Envelope {
            status: false,
            message: "Failed to verify transaction. Please retry".to_string(),
            data: Some(TopUpResult::Pending {
                provider_status: status,
            }),
        },
    };

    Ok(Json(envelope))
}
