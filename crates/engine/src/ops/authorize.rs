use chrono::Utc;
use sea_orm::{
    ActiveValue, QueryFilter, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    EngineError, OutboundMessage, ResultEngine, TokenStatus, TransferToken, pins,
    transfer_tokens,
    util::{parse_uuid, validate_pin},
    wallets,
};

use super::{
    Engine, accounts::require_account, tokens::hydrate_one, wallets::require_wallet, with_tx,
};

impl Engine {
    /// Authorize a bound token: debit the sender, credit the receiver and
    /// mark the token redeemed, all in one store transaction.
    ///
    /// Only the sender may authorize, with their PIN. The token row moves to
    /// `Redeemed` only if it is still bound to the same receiver and amount
    /// that were checked, and the debit only applies while the balance
    /// covers it, so concurrent attempts cannot both succeed.
    pub async fn authorize(
        &self,
        caller_id: Uuid,
        token: &str,
        pin: &str,
    ) -> ResultEngine<TransferToken> {
        let token = token.trim();
        let model = transfer_tokens::Entity::find_by_id(token.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::TokenNotFound(token.to_string()))?;

        if model.status()? == TokenStatus::Redeemed {
            return Err(EngineError::AlreadyRedeemed(token.to_string()));
        }
        let sender_id = parse_uuid(&model.sender_id, "sender")?;
        if sender_id != caller_id {
            tracing::warn!(%caller_id, token, "authorization attempted by non-sender");
            return Err(EngineError::Forbidden(
                "only the issuer of a token can authorize it".to_string(),
            ));
        }
        let (Some(receiver_id), Some(amount_minor)) =
            (model.receiver_id.clone(), model.amount_minor)
        else {
            tracing::debug!(token, "token is not bound to a receiver");
            return Err(EngineError::TokenNotFound(token.to_string()));
        };

        self.verify_pin(caller_id, pin).await?;

        let sender_wallet = require_wallet(&self.database, sender_id).await?;
        if sender_wallet.balance_minor < amount_minor {
            return Err(EngineError::InsufficientFunds(
                "wallet balance is too low for this payment".to_string(),
            ));
        }
        let receiver_id = parse_uuid(&receiver_id, "receiver")?;

        let redeemed = with_tx!(self, |db_tx| {
            let now = Utc::now();

            let finalized = transfer_tokens::Entity::update_many()
                .col_expr(
                    transfer_tokens::Column::Status,
                    Expr::value(TokenStatus::Redeemed.as_str()),
                )
                .col_expr(transfer_tokens::Column::RedeemedAt, Expr::value(now))
                .filter(transfer_tokens::Column::Token.eq(token))
                .filter(transfer_tokens::Column::Status.eq(TokenStatus::Bound.as_str()))
                .filter(transfer_tokens::Column::ReceiverId.eq(receiver_id.to_string()))
                .filter(transfer_tokens::Column::AmountMinor.eq(amount_minor))
                .exec(&db_tx)
                .await?;
            if finalized.rows_affected == 0 {
                let current = transfer_tokens::Entity::find_by_id(token.to_string())
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::TokenNotFound(token.to_string()))?;
                return Err(match current.status()? {
                    TokenStatus::Redeemed => EngineError::AlreadyRedeemed(token.to_string()),
                    _ => EngineError::StaleToken(token.to_string()),
                });
            }

            let debited = wallets::Entity::update_many()
                .col_expr(
                    wallets::Column::BalanceMinor,
                    Expr::col(wallets::Column::BalanceMinor).sub(amount_minor),
                )
                .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
                .filter(wallets::Column::AccountId.eq(sender_id.to_string()))
                .filter(wallets::Column::BalanceMinor.gte(amount_minor))
                .exec(&db_tx)
                .await?;
            if debited.rows_affected == 0 {
                return Err(EngineError::InsufficientFunds(
                    "wallet balance is too low for this payment".to_string(),
                ));
            }

            let credited = wallets::Entity::update_many()
                .col_expr(
                    wallets::Column::BalanceMinor,
                    Expr::col(wallets::Column::BalanceMinor).add(amount_minor),
                )
                .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
                .filter(wallets::Column::AccountId.eq(receiver_id.to_string()))
                .exec(&db_tx)
                .await?;
            if credited.rows_affected == 0 {
                return Err(EngineError::WalletNotFound(receiver_id.to_string()));
            }

            let model = transfer_tokens::Entity::find_by_id(token.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::TokenNotFound(token.to_string()))?;
            hydrate_one(&db_tx, model).await
        })?;

        tracing::info!(
            token,
            %sender_id,
            %receiver_id,
            amount_minor,
            "transfer authorized"
        );
        self.announce_transfer(&redeemed);

        Ok(redeemed)
    }

    fn announce_transfer(&self, transfer: &TransferToken) {
        let (Some(receiver), Some(amount)) = (&transfer.receiver, transfer.amount) else {
            return;
        };
        self.outbox.enqueue(OutboundMessage::email(
            transfer.sender.email.clone(),
            "Payment sent",
            format!(
                "You sent {amount} to {} with token {}.",
                receiver.display_name, transfer.token
            ),
        ));
        self.outbox.enqueue(OutboundMessage::email(
            receiver.email.clone(),
            "Payment received",
            format!(
                "You received {amount} from {}.",
                transfer.sender.display_name
            ),
        ));
    }

    /// Create or replace the PIN of an account.
    pub async fn set_pin(&self, account_id: Uuid, pin: &str) -> ResultEngine<()> {
        validate_pin(pin)?;
        require_account(&self.database, account_id).await?;
        let pin_hash = self.hash_secret(pin).await?;

        with_tx!(self, |db_tx| {
            let model = pins::ActiveModel {
                account_id: ActiveValue::Set(account_id.to_string()),
                pin_hash: ActiveValue::Set(pin_hash),
                updated_at: ActiveValue::Set(Utc::now()),
            };
            pins::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(pins::Column::AccountId)
                        .update_columns([pins::Column::PinHash, pins::Column::UpdatedAt])
                        .to_owned(),
                )
                .exec(&db_tx)
                .await?;
            Ok(())
        })?;

        tracing::info!(%account_id, "pin updated");
        Ok(())
    }

    /// Check `pin` against the stored hash for `account_id`.
    pub async fn verify_pin(&self, account_id: Uuid, pin: &str) -> ResultEngine<()> {
        let record = pins::Entity::find()
            .filter(pins::Column::AccountId.eq(account_id.to_string()))
            .one(&self.database)
            .await?
            .ok_or(EngineError::PinNotSet)?;

        if self.verify_secret(record.pin_hash, pin).await? {
            Ok(())
        } else {
            tracing::debug!(%account_id, "pin mismatch");
            Err(EngineError::InvalidPin)
        }
    }
}
