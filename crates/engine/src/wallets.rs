//! The module contains `Wallet` struct and its table.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, util::parse_uuid};

/// A wallet.
///
/// The balance record owned by an account. It is created together with the
/// account and mutated only by authorized transfers and reconciled top-ups,
/// each inside a transaction that also writes the token state change or the
/// funding reference that justifies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub account_id: Uuid,
    pub balance: Money,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh, empty wallet for `account_id`.
    pub fn new(account_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            balance: Money::ZERO,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub account_id: String,
    pub balance_minor: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Wallet> for ActiveModel {
    fn from(value: &Wallet) -> Self {
        Self {
            id: sea_orm::ActiveValue::Set(value.id.to_string()),
            account_id: sea_orm::ActiveValue::Set(value.account_id.to_string()),
            balance_minor: sea_orm::ActiveValue::Set(value.balance.minor()),
            updated_at: sea_orm::ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Wallet {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "wallet")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            balance: Money::new(model.balance_minor),
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wallet_is_empty() {
        let account_id = Uuid::new_v4();
        let wallet = Wallet::new(account_id);

        assert_eq!(wallet.account_id, account_id);
        assert_eq!(wallet.balance, Money::ZERO);
    }

    #[test]
    fn model_round_trips_through_active_model() {
        let wallet = Wallet::new(Uuid::new_v4());
        let active: ActiveModel = (&wallet).into();

        assert_eq!(
            active.account_id,
            sea_orm::ActiveValue::Set(wallet.account_id.to_string())
        );
        assert_eq!(active.balance_minor, sea_orm::ActiveValue::Set(0));
    }

    #[test]
    fn corrupt_ids_are_rejected() {
        let model = Model {
            id: "not-a-uuid".to_string(),
            account_id: Uuid::new_v4().to_string(),
            balance_minor: 10,
            updated_at: Utc::now(),
        };

        assert!(matches!(
            Wallet::try_from(model),
            Err(EngineError::InvalidId(_))
        ));
    }
}
