//! Accounts table.
//!
//! An account is the identity record of a registered user. It owns exactly
//! one wallet and, optionally, one PIN.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ResultEngine, util::parse_uuid};

/// Public view of an account. The password hash never leaves the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::wallets::Entity")]
    Wallet,
    #[sea_orm(has_one = "super::pins::Entity")]
    Pin,
    #[sea_orm(has_many = "super::funding_references::Entity")]
    FundingReferences,
}

impl Related<super::wallets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallet.def()
    }
}

impl Related<super::pins::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pin.def()
    }
}

impl Related<super::funding_references::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FundingReferences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Account {
    type Error = crate::EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            email: model.email,
            display_name: model.display_name,
            created_at: model.created_at,
        })
    }
}
