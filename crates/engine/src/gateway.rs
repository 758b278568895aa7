//! Payment gateway port.
//!
//! The engine never talks HTTP itself; the `gateway` crate provides the real
//! client and tests plug in fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Money;

pub type GatewayResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// What the provider reports about a charge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Provider status string, `"success"` once the charge settled.
    pub status: String,
    /// Reference the provider filed the charge under, when it reports one.
    pub reference: Option<String>,
    /// Charged amount in minor units.
    pub amount: Money,
    /// Reusable payment-method authorization, when the provider offers one.
    pub authorization: Option<String>,
}

impl Verification {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a charge for `email`, returning the provider access code.
    async fn initialize(&self, email: &str, amount: Money) -> GatewayResult<String>;

    /// Look up the state of a charge by its external reference.
    async fn verify(&self, reference: &str) -> GatewayResult<Verification>;
}

/// Placeholder used when no gateway is configured: every call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn initialize(&self, _email: &str, _amount: Money) -> GatewayResult<String> {
        Err("payment gateway is not configured".into())
    }

    async fn verify(&self, _reference: &str) -> GatewayResult<Verification> {
        Err("payment gateway is not configured".into())
    }
}
