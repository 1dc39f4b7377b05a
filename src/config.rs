//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::bank::paystack::DEFAULT_BASE_URL;

/// Which `Bank` implementation is wired in at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankMode {
    #[default]
    Paystack,
    Simulator,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `PAYSTACK_SECRET_KEY` (required): processor API secret
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8080
/// - `PUBLIC_BASE_URL` (optional): externally reachable base for the redirect callback
/// - `PAYSTACK_BASE_URL` (optional): processor API root
/// - `WEBHOOK_SECRET` (optional): webhook HMAC secret, defaults to the processor secret
/// - `BANK_MODE` (optional): `paystack` or `simulator`
/// - `SIMULATOR_FAILURE_RATE`, `SIMULATOR_DELAY_MS` (optional): simulator tuning
/// - `BANK_TIMEOUT_SECS` (optional): processor request timeout, defaults to 10
/// - `PAYMENT_CURRENCY` (optional): defaults to NGN
/// - `JWT_PUBLIC_KEY_PATH` (optional): RS256 verification key, defaults to `keys/public.pem`
/// - `JWT_PRIVATE_KEY` (optional): enables the development token endpoint
/// - `DEV_AUTH_USERNAME`, `DEV_AUTH_PASSWORD` (optional): development token credentials
#[derive(Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub public_base_url: Option<String>,

    pub paystack_secret_key: String,

    #[serde(default = "default_paystack_base_url")]
    pub paystack_base_url: String,

    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub bank_mode: BankMode,

    #[serde(default)]
    pub simulator_failure_rate: f64,

    #[serde(default)]
    pub simulator_delay_ms: u64,

    #[serde(default = "default_bank_timeout")]
    pub bank_timeout_secs: u64,

    #[serde(default = "default_currency")]
    pub payment_currency: String,

    #[serde(default = "default_public_key_path")]
    pub jwt_public_key_path: String,

    #[serde(default)]
    pub jwt_private_key: Option<String>,

    #[serde(default)]
    pub dev_auth_username: Option<String>,

    #[serde(default)]
    pub dev_auth_password: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8080
}

fn default_paystack_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_bank_timeout() -> u64 {
    10
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_public_key_path() -> String {
    "keys/public.pem".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    /// Where the processor sends the payer after checkout.
    pub fn callback_url(&self) -> String {
        let base = self
            .public_base_url
            .clone()
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", self.server_port));
        format!("{}/v1/payments/callback/verify", base.trim_end_matches('/'))
    }

    /// Webhook signing secret; the processor signs with its API secret unless told otherwise.
    pub fn webhook_secret(&self) -> Option<String> {
        self.webhook_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .or_else(|| Some(self.paystack_secret_key.clone()))
            .filter(|secret| !secret.is_empty())
    }

    /// Development signing key with escaped newlines restored.
    pub fn jwt_private_key_pem(&self) -> Option<String> {
        self.jwt_private_key
            .as_deref()
            .filter(|pem| !pem.trim().is_empty())
            .map(|pem| pem.replace("\\n", "\n"))
    }

    /// Development token credentials, when both are set.
    pub fn dev_credentials(&self) -> Option<(String, String)> {
        match (&self.dev_auth_username, &self.dev_auth_password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("public_base_url", &self.public_base_url)
            .field("paystack_base_url", &self.paystack_base_url)
            .field("bank_mode", &self.bank_mode)
            .field("simulator_failure_rate", &self.simulator_failure_rate)
            .field("simulator_delay_ms", &self.simulator_delay_ms)
            .field("bank_timeout_secs", &self.bank_timeout_secs)
            .field("payment_currency", &self.payment_currency)
            .field("jwt_public_key_path", &self.jwt_public_key_path)
            .finish_non_exhaustive()
    }
}
