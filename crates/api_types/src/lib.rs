//! Wire types shared by the HTTP server and its clients.
//!
//! Amounts travel as decimal strings with at most two fractional digits
//! (`"300"`, `"300.50"`); ids are UUID strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Uniform response body: `{"status": bool, "message": string, "data": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            data: None,
        }
    }
}

impl Envelope<()> {
    /// Success without a payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: None,
        }
    }
}

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Register {
        pub email: String,
        pub fullname: String,
        pub password: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Login {
        pub email: String,
        pub password: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccountView {
        pub id: Uuid,
        pub email: String,
        pub fullname: String,
        pub created_at: DateTime<Utc>,
    }

    /// Returned by register and login. `token` is the bearer credential for
    /// every other endpoint.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Session {
        pub account: AccountView,
        pub token: String,
    }
}

pub mod pin {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Pin {
        pub pin: String,
    }
}

pub mod wallet {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct WalletView {
        pub balance: String,
        pub updated_at: DateTime<Utc>,
    }
}

pub mod topup {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TopUpInit {
        pub amount: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccessCode {
        pub access_code: String,
    }

    /// Result of `GET /api/txn/verify/{ref}`.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "outcome", rename_all = "snake_case")]
    pub enum TopUpResult {
        Credited { amount: String },
        Pending { provider_status: String },
    }
}

pub mod card {
    use super::*;

    /// `POST /api/card/new`. The cvv is checked, never stored or echoed.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct NewCard {
        pub card_no: String,
        pub cvv: String,
        pub expiry_month: String,
        pub expiry_year: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CardView {
        pub id: Uuid,
        pub card_no: String,
        pub expiry_month: u32,
        pub expiry_year: i32,
        pub created_at: DateTime<Utc>,
    }
}

pub mod payment {
    use super::*;

    /// Receiver side: bind a token for an amount.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct Redeem {
        pub token: String,
        pub amount: String,
    }

    /// Sender side: confirm a bound token with the PIN.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct Authorize {
        pub token: String,
        pub pin: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TokenStatus {
        Open,
        Bound,
        Redeemed,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PartyView {
        pub id: Uuid,
        pub email: String,
        pub fullname: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TokenView {
        pub token: String,
        pub status: TokenStatus,
        pub amount: Option<String>,
        pub sender: PartyView,
        pub receiver: Option<PartyView>,
        pub created_at: DateTime<Utc>,
        pub redeemed_at: Option<DateTime<Utc>>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_omit_data() {
        let body = serde_json::to_value(Envelope::<()>::fail("Pin is invalid/incorrect")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": false, "message": "Pin is invalid/incorrect"})
        );
    }

    #[test]
    fn top_up_result_is_tagged() {
        let body = serde_json::to_value(topup::TopUpResult::Pending {
            provider_status: "ongoing".to_string(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"outcome": "pending", "provider_status": "ongoing"})
        );
    }
}
