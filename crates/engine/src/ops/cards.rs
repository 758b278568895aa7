use chrono::Utc;
use sea_orm::{QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    Card, NewCard, ResultEngine, cards,
    util::{mask_card_number, parse_card_expiry, validate_cvv},
};

use super::{Engine, accounts::require_account};

impl Engine {
    /// Keep a card on file for the account. The CVV is checked for shape and
    /// never written.
    pub async fn add_card(&self, account_id: Uuid, card: &NewCard) -> ResultEngine<Card> {
        require_account(&self.database, account_id).await?;

        let masked_number = mask_card_number(&card.number)?;
        validate_cvv(card.cvv.trim())?;
        let now = Utc::now();
        let (expiry_month, expiry_year) =
            parse_card_expiry(&card.expiry_month, &card.expiry_year, now)?;

        let card = Card {
            id: Uuid::new_v4(),
            account_id,
            masked_number,
            expiry_month,
            expiry_year,
            created_at: now,
        };
        cards::ActiveModel::from(&card).insert(&self.database).await?;

        tracing::info!(%account_id, card = %card.masked_number, "card added");
        Ok(card)
    }

    /// Cards on file for the account, newest first.
    pub async fn cards(&self, account_id: Uuid) -> ResultEngine<Vec<Card>> {
        require_account(&self.database, account_id).await?;

        cards::Entity::find()
            .filter(cards::Column::AccountId.eq(account_id.to_string()))
            .order_by_desc(cards::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Card::try_from)
            .collect()
    }
}
