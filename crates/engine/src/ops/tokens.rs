use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, Condition, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    EngineError, Money, NotificationEvent, Party, ResultEngine, TokenStatus, TransferToken,
    accounts, transfer_tokens, util::parse_uuid,
};

use super::{
    Engine, accounts::require_account, is_unique_violation, wallets::require_wallet, with_tx,
};

/// How many fresh candidates `issue_token` draws before giving up.
pub const MAX_TOKEN_ATTEMPTS: u32 = 8;

impl Engine {
    /// Issue an `Open` token for `sender_id`.
    ///
    /// Candidates are checked against the store before insertion and the
    /// primary key rejects any that slip through; either way a collision
    /// draws a new candidate, up to [`MAX_TOKEN_ATTEMPTS`].
    pub async fn issue_token(&self, sender_id: Uuid) -> ResultEngine<TransferToken> {
        let sender = require_account(&self.database, sender_id).await?;
        let sender = Party::from(crate::Account::try_from(sender)?);

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let candidate = self.tokens.generate();
            let taken = transfer_tokens::Entity::find_by_id(candidate.clone())
                .one(&self.database)
                .await?
                .is_some();
            if taken {
                tracing::warn!(attempt, "token collision, regenerating");
                continue;
            }

            let created_at = Utc::now();
            let model = transfer_tokens::ActiveModel {
                token: ActiveValue::Set(candidate.clone()),
                status: ActiveValue::Set(TokenStatus::Open.as_str().to_string()),
                sender_id: ActiveValue::Set(sender_id.to_string()),
                receiver_id: ActiveValue::Set(None),
                amount_minor: ActiveValue::Set(None),
                created_at: ActiveValue::Set(created_at),
                bound_at: ActiveValue::Set(None),
                redeemed_at: ActiveValue::Set(None),
            };
            match model.insert(&self.database).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    tracing::warn!(attempt, "token collision on insert, regenerating");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            tracing::info!(%sender_id, token = %candidate, "token issued");
            return Ok(TransferToken {
                token: candidate,
                status: TokenStatus::Open,
                sender,
                receiver: None,
                amount: None,
                created_at,
                redeemed_at: None,
            });
        }

        tracing::error!(%sender_id, "could not generate a unique token");
        Err(EngineError::ExhaustedRetries(MAX_TOKEN_ATTEMPTS))
    }

    /// Bind `token` to `receiver_id` for `amount`.
    ///
    /// The receiver that bound the token first may bind it again to change
    /// the amount until the sender authorizes it. No funds move here; the
    /// sender is notified once the binding is committed.
    pub async fn bind_token(
        &self,
        token: &str,
        receiver_id: Uuid,
        amount: Money,
    ) -> ResultEngine<TransferToken> {
        let amount = amount.ensure_positive()?;
        let token = token.trim();

        let model = with_tx!(self, |db_tx| {
            let model = transfer_tokens::Entity::find_by_id(token.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::TokenNotFound(token.to_string()))?;

            let sender_id = parse_uuid(&model.sender_id, "sender")?;
            match model.status()? {
                TokenStatus::Redeemed => {
                    return Err(EngineError::AlreadyRedeemed(token.to_string()));
                }
                TokenStatus::Bound if model.receiver_id != Some(receiver_id.to_string()) => {
                    return Err(EngineError::AlreadyBound(token.to_string()));
                }
                TokenStatus::Open | TokenStatus::Bound => {}
            }
            if sender_id == receiver_id {
                return Err(EngineError::Validation(
                    "You cannot redeem a token you issued".to_string(),
                ));
            }
            require_account(&db_tx, receiver_id).await?;

            // Advisory only: authorization re-checks under the debit guard.
            let sender_wallet = require_wallet(&db_tx, sender_id).await?;
            if sender_wallet.balance_minor < amount.minor() {
                return Err(EngineError::InsufficientFunds(
                    "sender has insufficient balance for this payment".to_string(),
                ));
            }

            let updated = transfer_tokens::Entity::update_many()
                .col_expr(
                    transfer_tokens::Column::Status,
                    Expr::value(TokenStatus::Bound.as_str()),
                )
                .col_expr(
                    transfer_tokens::Column::ReceiverId,
                    Expr::value(receiver_id.to_string()),
                )
                .col_expr(
                    transfer_tokens::Column::AmountMinor,
                    Expr::value(amount.minor()),
                )
                .col_expr(transfer_tokens::Column::BoundAt, Expr::value(Utc::now()))
                .filter(transfer_tokens::Column::Token.eq(token))
                .filter(
                    Condition::any()
                        .add(transfer_tokens::Column::Status.eq(TokenStatus::Open.as_str()))
                        .add(
                            Condition::all()
                                .add(
                                    transfer_tokens::Column::Status
                                        .eq(TokenStatus::Bound.as_str()),
                                )
                                .add(
                                    transfer_tokens::Column::ReceiverId
                                        .eq(receiver_id.to_string()),
                                ),
                        ),
                )
                .exec(&db_tx)
                .await?;
            if updated.rows_affected == 0 {
                return Err(EngineError::StaleToken(token.to_string()));
            }

            transfer_tokens::Entity::find_by_id(token.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::TokenNotFound(token.to_string()))
        })?;

        let bound = hydrate_one(&self.database, model).await?;
        tracing::info!(token = %bound.token, %receiver_id, amount = %amount, "token bound");

        if let Some(receiver) = bound.receiver.clone() {
            self.notifier.notify(
                bound.sender.id,
                &NotificationEvent::TokenBound {
                    token: bound.token.clone(),
                    amount,
                    receiver,
                },
            );
        }

        Ok(bound)
    }

    /// Resolve a token with both parties, or `None` if it does not exist.
    pub async fn lookup_token(&self, token: &str) -> ResultEngine<Option<TransferToken>> {
        let Some(model) = transfer_tokens::Entity::find_by_id(token.trim().to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        hydrate_one(&self.database, model).await.map(Some)
    }

    /// Like [`Engine::lookup_token`], but only for the token's sender or
    /// receiver.
    pub async fn token_for(&self, caller_id: Uuid, token: &str) -> ResultEngine<TransferToken> {
        let found = self
            .lookup_token(token)
            .await?
            .ok_or_else(|| EngineError::TokenNotFound(token.trim().to_string()))?;

        let is_party = found.sender.id == caller_id
            || found
                .receiver
                .as_ref()
                .is_some_and(|receiver| receiver.id == caller_id);
        if !is_party {
            return Err(EngineError::Forbidden(
                "token belongs to another account".to_string(),
            ));
        }
        Ok(found)
    }

    /// Completed transfers sent or received by `account_id`, newest first.
    pub async fn history(&self, account_id: Uuid) -> ResultEngine<Vec<TransferToken>> {
        require_account(&self.database, account_id).await?;
        let account_id = account_id.to_string();

        let models = transfer_tokens::Entity::find()
            .filter(transfer_tokens::Column::Status.eq(TokenStatus::Redeemed.as_str()))
            .filter(transfer_tokens::Column::AmountMinor.gt(0))
            .filter(
                Condition::any()
                    .add(transfer_tokens::Column::SenderId.eq(account_id.as_str()))
                    .add(transfer_tokens::Column::ReceiverId.eq(account_id.as_str())),
            )
            .order_by_desc(transfer_tokens::Column::RedeemedAt)
            .all(&self.database)
            .await?;

        hydrate(&self.database, models).await
    }
}

pub(super) async fn hydrate_one<C: ConnectionTrait>(
    db: &C,
    model: transfer_tokens::Model,
) -> ResultEngine<TransferToken> {
    hydrate(db, vec![model])
        .await?
        .pop()
        .ok_or_else(|| EngineError::Internal("token vanished while resolving".to_string()))
}

/// Attach sender and receiver identities, loading each account once.
async fn hydrate<C: ConnectionTrait>(
    db: &C,
    models: Vec<transfer_tokens::Model>,
) -> ResultEngine<Vec<TransferToken>> {
    let mut ids: Vec<String> = models
        .iter()
        .flat_map(|m| std::iter::once(m.sender_id.clone()).chain(m.receiver_id.clone()))
        .collect();
    ids.sort();
    ids.dedup();

    let parties: HashMap<String, Party> = if ids.is_empty() {
        HashMap::new()
    } else {
        accounts::Entity::find()
            .filter(accounts::Column::Id.is_in(ids))
            .all(db)
            .await?
            .into_iter()
            .map(|model| {
                let id = model.id.clone();
                crate::Account::try_from(model).map(|account| (id, Party::from(account)))
            })
            .collect::<ResultEngine<_>>()?
    };

    let party = |id: &str| {
        parties
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::AccountNotFound(id.to_string()))
    };

    models
        .into_iter()
        .map(|model| {
            Ok(TransferToken {
                status: model.status()?,
                sender: party(&model.sender_id)?,
                receiver: model.receiver_id.as_deref().map(party).transpose()?,
                amount: model.amount_minor.map(Money::new),
                created_at: model.created_at,
                redeemed_at: model.redeemed_at,
                token: model.token,
            })
        })
        .collect()
}
