//! Transfer tokens.
//!
//! A transfer token is a single-use capability issued by a sender. It moves
//! through `Open -> Bound -> Redeemed`:
//!
//! - `Open`: freshly issued, no receiver and no amount.
//! - `Bound`: a receiver presented it together with an amount.
//! - `Redeemed`: the sender authorized it and the funds moved. Terminal.

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Open,
    Bound,
    Redeemed,
}

impl TokenStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Bound => "bound",
            Self::Redeemed => "redeemed",
        }
    }
}

impl TryFrom<&str> for TokenStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "open" => Ok(Self::Open),
            "bound" => Ok(Self::Bound),
            "redeemed" => Ok(Self::Redeemed),
            other => Err(EngineError::Internal(format!(
                "invalid token status: {other}"
            ))),
        }
    }
}

/// Identity of one side of a transfer, resolved eagerly for callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

impl From<crate::Account> for Party {
    fn from(account: crate::Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            display_name: account.display_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToken {
    pub token: String,
    pub status: TokenStatus,
    pub sender: Party,
    pub receiver: Option<Party>,
    pub amount: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transfer_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub status: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub amount_minor: Option<i64>,
    pub created_at: DateTimeUtc,
    pub bound_at: Option<DateTimeUtc>,
    pub redeemed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::SenderId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Sender,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::ReceiverId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Receiver,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub(crate) fn status(&self) -> ResultEngine<TokenStatus> {
        TokenStatus::try_from(self.status.as_str())
    }
}

/// Source of candidate token strings.
///
/// Uniqueness is enforced against the store by the engine; implementations
/// only need to be unguessable.
pub trait TokenSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Crockford base32 alphabet: no `I`, `L`, `O` or `U`, so tokens survive
/// being read out loud.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 5;

/// Draws `XXXXX-XXXXX-XXXXX-XXXXX` tokens from the OS CSPRNG (100 bits).
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokenSource;

impl TokenSource for RandomTokenSource {
    fn generate(&self) -> String {
        let mut rng = OsRng;
        let mut out = String::with_capacity(GROUPS * (GROUP_LEN + 1));
        for group in 0..GROUPS {
            if group > 0 {
                out.push('-');
            }
            for _ in 0..GROUP_LEN {
                let idx = rng.gen_range(0..ALPHABET.len());
                out.push(char::from(ALPHABET[idx]));
            }
        }
        out
    }
}
