use chrono::Utc;
use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Account, EngineError, OutboundMessage, ResultEngine, Wallet, accounts,
    util::{normalize_display_name, normalize_email, validate_password},
    wallets,
};

use super::{Engine, is_unique_violation, with_tx};

impl Engine {
    /// Register a new account together with its empty wallet.
    ///
    /// The email is the login key and must not belong to another account.
    /// A welcome email is queued once the account is committed.
    pub async fn register(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> ResultEngine<Account> {
        let email = normalize_email(email)?;
        let display_name = normalize_display_name(display_name)?;
        validate_password(password)?;

        let in_use = || {
            EngineError::ExistingKey(format!(
                "Email address '{email}' already in use by another user"
            ))
        };

        if accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email.as_str()))
            .one(&self.database)
            .await?
            .is_some()
        {
            return Err(in_use());
        }

        let password_hash = self.hash_secret(password).await?;
        let account = Account {
            id: Uuid::new_v4(),
            email: email.clone(),
            display_name,
            created_at: Utc::now(),
        };

        with_tx!(self, |db_tx| {
            let model = accounts::ActiveModel {
                id: ActiveValue::Set(account.id.to_string()),
                email: ActiveValue::Set(account.email.clone()),
                display_name: ActiveValue::Set(account.display_name.clone()),
                password_hash: ActiveValue::Set(password_hash),
                created_at: ActiveValue::Set(account.created_at),
            };
            match model.insert(&db_tx).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => return Err(in_use()),
                Err(err) => return Err(err.into()),
            }

            let wallet = Wallet::new(account.id);
            wallets::ActiveModel::from(&wallet).insert(&db_tx).await?;
            Ok(())
        })?;

        tracing::info!(account_id = %account.id, "account registered");
        self.outbox.enqueue(OutboundMessage::email(
            account.email.clone(),
            "Welcome to PocketPay",
            format!(
                "Hi {}, your account is ready. Fund your wallet to start sending money.",
                account.display_name
            ),
        ));

        Ok(account)
    }

    /// Check an email/password pair.
    pub async fn authenticate(&self, email: &str, password: &str) -> ResultEngine<Account> {
        let email = normalize_email(email)?;
        let model = accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email.as_str()))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotRegistered(email.clone()))?;

        if !self
            .verify_secret(model.password_hash.clone(), password)
            .await?
        {
            tracing::debug!(account_id = %model.id, "password mismatch");
            return Err(EngineError::InvalidCredentials);
        }

        Account::try_from(model)
    }

    /// Return an account by id.
    pub async fn account(&self, account_id: Uuid) -> ResultEngine<Account> {
        let model = require_account(&self.database, account_id).await?;
        Account::try_from(model)
    }
}

pub(super) async fn require_account<C: ConnectionTrait>(
    db: &C,
    account_id: Uuid,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find_by_id(account_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::AccountNotFound(account_id.to_string()))
}
