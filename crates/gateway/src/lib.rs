//! Paystack-compatible payment gateway client.
//!
//! Implements [`engine::PaymentGateway`] over the provider's REST API:
//! `POST /transaction/initialize` and `GET /transaction/verify/{reference}`,
//! authenticated with the secret key as a bearer token.

use async_trait::async_trait;
use engine::{GatewayResult, Money, PaymentGateway, Verification};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Provider { status: StatusCode, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid base url: {0}")]
    BaseUrl(String),
}

#[derive(Clone, Debug)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

/// Every provider response is wrapped like this.
#[derive(Debug, Deserialize)]
struct ProviderEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    /// Minor units, as a string.
    amount: String,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    access_code: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    #[serde(default)]
    reference: Option<String>,
    amount: i64,
    authorization: Option<AuthorizationData>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationData {
    authorization_code: String,
    #[serde(default)]
    reusable: bool,
}

impl PaystackClient {
    pub fn new(client: Client, base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// The reference always lands in a single percent-encoded path segment,
    /// so `/`, `?` and `#` cannot change which charge is looked up.
    fn verify_url(&self, reference: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.url("/transaction/verify"))
            .map_err(|err| GatewayError::BaseUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::BaseUrl(self.base_url.clone()))?
            .push(reference);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, GatewayError> {
        let status = resp.status();
        let body = resp.text().await?;
        unwrap_envelope(status, &body)
    }

    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount: Money,
    ) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.secret_key)
            .json(&InitializeRequest {
                email,
                amount: amount.minor().to_string(),
            })
            .send()
            .await?;
        let data: InitializeData = Self::read(resp).await?;
        Ok(data.access_code)
    }

    pub async fn verify_transaction(&self, reference: &str) -> Result<Verification, GatewayError> {
        let resp = self
            .client
            .get(self.verify_url(reference)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let data: VerifyData = Self::read(resp).await?;
        Ok(data.into())
    }
}

impl From<VerifyData> for Verification {
    fn from(data: VerifyData) -> Self {
        Self {
            status: data.status,
            reference: data.reference,
            amount: Money::new(data.amount),
            authorization: data
                .authorization
                .filter(|auth| auth.reusable)
                .map(|auth| auth.authorization_code),
        }
    }
}

fn unwrap_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, GatewayError> {
    let envelope: ProviderEnvelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(err) if status.is_success() => return Err(GatewayError::Decode(err.to_string())),
        Err(_) => {
            return Err(GatewayError::Provider {
                status,
                message: "provider error".to_string(),
            });
        }
    };

    if !status.is_success() || !envelope.status {
        return Err(GatewayError::Provider {
            status,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::Decode("missing data".to_string()))
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, email: &str, amount: Money) -> GatewayResult<String> {
        Ok(self.initialize_transaction(email, amount).await?)
    }

    async fn verify(&self, reference: &str) -> GatewayResult<Verification> {
        let verification = self.verify_transaction(reference).await?;
        tracing::debug!(reference, status = %verification.status, "charge verified");
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_payload_maps_to_verification() {
        let body = r#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": "T123",
                "amount": 50000,
                "authorization": {"authorization_code": "AUTH_abc", "reusable": true}
            }
        }"#;

        let data: VerifyData = unwrap_envelope(StatusCode::OK, body).unwrap();
        let verification = Verification::from(data);

        assert!(verification.is_success());
        assert_eq!(verification.reference.as_deref(), Some("T123"));
        assert_eq!(verification.amount, Money::new(50_000));
        assert_eq!(verification.authorization.as_deref(), Some("AUTH_abc"));
    }

    #[test]
    fn non_reusable_authorization_is_dropped() {
        let body = r#"{"status": true, "message": "ok",
            "data": {"status": "abandoned", "amount": 100,
                     "authorization": {"authorization_code": "AUTH_x", "reusable": false}}}"#;

        let verification = Verification::from(
            unwrap_envelope::<VerifyData>(StatusCode::OK, body).unwrap(),
        );

        assert!(!verification.is_success());
        assert_eq!(verification.authorization, None);
    }

    #[test]
    fn provider_rejection_is_an_error() {
        let body = r#"{"status": false, "message": "Transaction reference not found"}"#;

        let err = unwrap_envelope::<VerifyData>(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Provider { status, ref message }
                if status == StatusCode::BAD_REQUEST && message == "Transaction reference not found"
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            unwrap_envelope::<InitializeData>(StatusCode::OK, "<html>"),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn urls_are_joined_cleanly() {
        let client = PaystackClient::new(Client::new(), "https://api.example.com/", "sk_test");
        assert_eq!(
            client.url("/transaction/verify/abc"),
            "https://api.example.com/transaction/verify/abc"
        );
    }

    #[test]
    fn references_stay_in_one_path_segment() {
        let client = PaystackClient::new(Client::new(), "https://api.example.com/v1/", "sk_test");

        assert_eq!(
            client.verify_url("REF123").unwrap().as_str(),
            "https://api.example.com/v1/transaction/verify/REF123"
        );
        assert_eq!(
            client.verify_url("x/../REF123").unwrap().as_str(),
            "https://api.example.com/v1/transaction/verify/x%2F..%2FREF123"
        );
        assert_eq!(
            client.verify_url("REF123#b").unwrap().as_str(),
            "https://api.example.com/v1/transaction/verify/REF123%23b"
        );
        assert_eq!(
            client.verify_url("REF123?a").unwrap().as_str(),
            "https://api.example.com/v1/transaction/verify/REF123%3Fa"
        );
    }

    #[test]
    fn unusable_base_url_is_an_error() {
        let client = PaystackClient::new(Client::new(), "not a url", "sk_test");
        assert!(matches!(
            client.verify_url("REF123"),
            Err(GatewayError::BaseUrl(_))
        ));
    }
}
