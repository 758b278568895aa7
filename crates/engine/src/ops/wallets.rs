use sea_orm::{ConnectionTrait, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, Wallet, wallets};

use super::Engine;

impl Engine {
    /// Return the current balance snapshot of an account's wallet.
    pub async fn wallet(&self, account_id: Uuid) -> ResultEngine<Wallet> {
        let model = require_wallet(&self.database, account_id).await?;
        Wallet::try_from(model)
    }
}

pub(super) async fn require_wallet<C: ConnectionTrait>(
    db: &C,
    account_id: Uuid,
) -> ResultEngine<wallets::Model> {
    wallets::Entity::find()
        .filter(wallets::Column::AccountId.eq(account_id.to_string()))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::WalletNotFound(account_id.to_string()))
}
