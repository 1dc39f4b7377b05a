//! Paystack REST adapter for the `Bank` capability.
//!
//! Every call carries the secret key as a bearer token. Responses arrive in
//! the envelope
//!
//! ```json
//! { "status": true, "message": "...", "data": { ... } }
//! ```
//!
//! and are mapped to the canonical shapes in `bank`. Any non-2xx answer,
//! an envelope with `status: false`, or a body that does not decode becomes
//! a `BankError` carrying the processor's message text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{
    AuthorizeRequest, AuthorizeResponse, Bank, BankError, RefundRequest, RefundResponse,
    VerifyResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

/// Client for the Paystack API.
#[derive(Clone)]
pub struct PaystackClient {
    secret_key: String,
    base_url: Url,
    http: Client,
}

// Keeps the secret key out of logs.
impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    #[serde(default)]
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RefundData {
    status: String,
    #[serde(default)]
    transaction: Option<RefundTransaction>,
}

#[derive(Debug, Deserialize)]
struct RefundTransaction {
    reference: String,
}

impl PaystackClient {
    /// Build a client against `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(
        secret_key: impl Into<String>,
        base_url: Url,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            secret_key: secret_key.into(),
            base_url,
            http,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BankError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BankError::Transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and unwrap the processor envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BankError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| BankError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| BankError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or_else(|e| format!("undecodable error body: {e}"));
            return Err(BankError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| BankError::Decode(e.to_string()))?;

        if !envelope.status {
            return Err(BankError::Processor(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| BankError::Decode("response has no data".to_string()))
    }
}

#[async_trait]
impl Bank for PaystackClient {
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, BankError> {
        let url = self.endpoint(&["transaction", "initialize"])?;
        let body = json!({
            "email": request.email,
            "amount": request.amount,
            "currency": request.currency,
            "callback_url": request.callback_url,
            "reference": request.payment_id,
        });

        tracing::debug!(payment_id = %request.payment_id, "initializing processor transaction");

        let data: InitializeData = self
            .send(
                self.http
                    .post(url)
                    .header("Idempotency-Key", &request.operation_id)
                    .json(&body),
            )
            .await?;

        Ok(AuthorizeResponse {
            reference: data.reference,
            authorization_url: data.authorization_url,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifyResponse, BankError> {
        let url = self.endpoint(&["transaction", "verify", reference])?;

        let data: VerifyData = self.send(self.http.get(url)).await?;

        Ok(VerifyResponse {
            reference: data.reference,
            status: data.status,
            amount: data.amount,
            currency: data.currency,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, BankError> {
        let url = self.endpoint(&["refund"])?;
        let body = json!({
            "transaction": request.reference,
            "amount": request.amount,
        });

        let data: RefundData = self
            .send(
                self.http
                    .post(url)
                    .header("Idempotency-Key", &request.operation_id)
                    .json(&body),
            )
            .await?;

        Ok(RefundResponse {
            reference: data
                .transaction
                .map(|t| t.reference)
                .unwrap_or(request.reference),
            status: data.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> PaystackClient {
        PaystackClient::new("sk_test", Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoint_escapes_reference_segments() {
        let url = client("https://api.paystack.co")
            .endpoint(&["transaction", "verify", "a/b c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.paystack.co/transaction/verify/a%2Fb%20c"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let url = client("http://127.0.0.1:9000/mock/")
            .endpoint(&["refund"])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/mock/refund");
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", client("https://api.paystack.co"));
        assert!(!rendered.contains("sk_test"));
    }
}
