use chrono::Utc;
use sea_orm::{
    ActiveValue, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, FundingReference, Money, OutboundMessage, ResultEngine, authorization_codes,
    funding_references, wallets,
};

use super::{Engine, accounts::require_account, is_unique_violation, with_tx};

/// Result of reconciling a top-up that did not fail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TopUpOutcome {
    /// The wallet was credited and the reference is now spent.
    Credited { amount: Money },
    /// The provider has not settled the charge yet; nothing was written, the
    /// same reference can be reconciled again later.
    Pending { status: String },
}

impl Engine {
    /// Start a gateway charge for the account's email, returning the
    /// provider access code.
    pub async fn init_top_up(&self, account_id: Uuid, amount: Money) -> ResultEngine<String> {
        let amount = amount.ensure_positive()?;
        let account = require_account(&self.database, account_id).await?;

        self.gateway
            .initialize(&account.email, amount)
            .await
            .map_err(|err| {
                tracing::error!(%account_id, "gateway initialize failed: {err}");
                EngineError::Gateway(err.to_string())
            })
    }

    /// Verify `reference` with the gateway and credit the account once.
    ///
    /// The funding reference row and the wallet credit are written in the
    /// same transaction; the unique key on the reference rejects a replay
    /// even when two reconciliations race past the initial check.
    pub async fn reconcile_top_up(
        &self,
        reference: &str,
        account_id: Uuid,
    ) -> ResultEngine<TopUpOutcome> {
        let reference = reference.trim();
        if !is_valid_reference(reference) {
            return Err(invalid_reference());
        }
        let account = require_account(&self.database, account_id).await?;

        let verification = self.gateway.verify(reference).await.map_err(|err| {
            tracing::warn!(reference, "gateway verification failed: {err}");
            EngineError::VerificationFailed(err.to_string())
        })?;

        // The stored key must be the reference the provider files the charge
        // under, otherwise a variant spelling would credit it twice.
        if let Some(filed) = verification.reference.as_deref() {
            if filed != reference {
                tracing::warn!(reference, filed, %account_id, "provider reports another reference");
                return Err(invalid_reference());
            }
        }

        let duplicate = || EngineError::DuplicateReference(reference.to_string());
        if funding_references::Entity::find_by_id(reference.to_string())
            .one(&self.database)
            .await?
            .is_some()
        {
            tracing::warn!(reference, %account_id, "funding reference replayed");
            return Err(duplicate());
        }

        if !verification.is_success() {
            tracing::info!(reference, status = %verification.status, "top-up not settled yet");
            return Ok(TopUpOutcome::Pending {
                status: verification.status,
            });
        }
        let amount = verification.amount.ensure_positive()?;

        with_tx!(self, |db_tx| {
            let now = Utc::now();
            let record = funding_references::ActiveModel {
                reference: ActiveValue::Set(reference.to_string()),
                account_id: ActiveValue::Set(account_id.to_string()),
                amount_minor: ActiveValue::Set(amount.minor()),
                created_at: ActiveValue::Set(now),
            };
            match record.insert(&db_tx).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => return Err(duplicate()),
                Err(err) => return Err(err.into()),
            }

            let credited = wallets::Entity::update_many()
                .col_expr(
                    wallets::Column::BalanceMinor,
                    Expr::col(wallets::Column::BalanceMinor).add(amount.minor()),
                )
                .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
                .filter(wallets::Column::AccountId.eq(account_id.to_string()))
                .exec(&db_tx)
                .await?;
            if credited.rows_affected == 0 {
                return Err(EngineError::WalletNotFound(account_id.to_string()));
            }
            Ok(())
        })?;

        tracing::info!(reference, %account_id, amount = %amount, "wallet funded");

        if let Some(code) = verification.authorization {
            if let Err(err) = self.save_authorization(&account.email, &code).await {
                tracing::warn!(%account_id, "could not store reusable authorization: {err}");
            }
        }

        self.outbox.enqueue(OutboundMessage::email(
            account.email,
            "Account funded",
            format!("Your wallet has been credited with {amount}."),
        ));

        Ok(TopUpOutcome::Credited { amount })
    }

    /// Credited top-ups of an account, newest first.
    pub async fn top_ups(&self, account_id: Uuid) -> ResultEngine<Vec<FundingReference>> {
        require_account(&self.database, account_id).await?;

        funding_references::Entity::find()
            .filter(funding_references::Column::AccountId.eq(account_id.to_string()))
            .order_by_desc(funding_references::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(FundingReference::try_from)
            .collect()
    }

    async fn save_authorization(&self, email: &str, code: &str) -> ResultEngine<()> {
        let model = authorization_codes::ActiveModel {
            email: ActiveValue::Set(email.to_string()),
            code: ActiveValue::Set(code.to_string()),
            updated_at: ActiveValue::Set(Utc::now()),
        };
        authorization_codes::Entity::insert(model)
            .on_conflict(
                OnConflict::column(authorization_codes::Column::Email)
                    .update_columns([
                        authorization_codes::Column::Code,
                        authorization_codes::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.database)
            .await?;
        Ok(())
    }
}

fn invalid_reference() -> EngineError {
    EngineError::Validation("Invalid transaction reference".to_string())
}

/// Provider references are short tokens of `[A-Za-z0-9._=-]` with at least
/// one alphanumeric.
fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '=' | '-'))
        && reference.chars().any(|ch| ch.is_ascii_alphanumeric())
}
