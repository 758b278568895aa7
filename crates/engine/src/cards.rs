//! Payment cards kept on file.
//!
//! Only the masked number and the expiry are stored. The full number and the
//! CVV are checked when the card is added and then dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// Card details as submitted by the holder.
#[derive(Clone)]
pub struct NewCard {
    pub number: String,
    pub cvv: String,
    pub expiry_month: String,
    pub expiry_year: String,
}

impl fmt::Debug for NewCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCard")
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub account_id: Uuid,
    /// All but the last four digits replaced with `*`.
    pub masked_number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub masked_number: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Card> for ActiveModel {
    fn from(value: &Card) -> Self {
        Self {
            id: sea_orm::ActiveValue::Set(value.id.to_string()),
            account_id: sea_orm::ActiveValue::Set(value.account_id.to_string()),
            masked_number: sea_orm::ActiveValue::Set(value.masked_number.clone()),
            expiry_month: sea_orm::ActiveValue::Set(value.expiry_month as i32),
            expiry_year: sea_orm::ActiveValue::Set(value.expiry_year),
            created_at: sea_orm::ActiveValue::Set(value.created_at),
        }
    }
}

impl TryFrom<Model> for Card {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let expiry_month = u32::try_from(model.expiry_month)
            .map_err(|_| EngineError::Internal("stored card expiry is corrupt".to_string()))?;
        Ok(Self {
            id: parse_uuid(&model.id, "card")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            masked_number: model.masked_number,
            expiry_month,
            expiry_year: model.expiry_year,
            created_at: model.created_at,
        })
    }
}
