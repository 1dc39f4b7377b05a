//! Payment gateway - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Load key material (caller token key, webhook secret)
//! 3. Create database connection pool and run migrations
//! 4. Wire the processor adapter selected by `BANK_MODE`
//! 5. Build HTTP router and start server on configured port

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use url::Url;

use paygate::{
    app::{self, AppState},
    bank::{Bank, paystack::PaystackClient, simulator::SimulatedBank},
    config::{BankMode, Config},
    db,
    middleware::auth::{JwtVerifier, TokenIssuer},
    services::{payment_service::CheckoutSettings, webhook_service::WebhookVerifier},
    store::postgres::PgPaymentStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let public_key = std::fs::read(&config.jwt_public_key_path)
        .with_context(|| format!("reading {}", config.jwt_public_key_path))?;
    let jwt = JwtVerifier::from_rsa_pem(&public_key).context("parsing JWT public key")?;

    let issuer = config
        .jwt_private_key_pem()
        .map(|pem| TokenIssuer::from_rsa_pem(pem.as_bytes()))
        .transpose()
        .context("parsing JWT private key")?;
    if issuer.is_some() {
        tracing::warn!("development token endpoint enabled");
    }

    let webhook = WebhookVerifier::new(config.webhook_secret());

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let bank: Arc<dyn Bank> = match config.bank_mode {
        BankMode::Paystack => {
            let base_url = Url::parse(&config.paystack_base_url)
                .with_context(|| format!("invalid PAYSTACK_BASE_URL {}", config.paystack_base_url))?;
            Arc::new(PaystackClient::new(
                config.paystack_secret_key.clone(),
                base_url,
                Duration::from_secs(config.bank_timeout_secs),
            )?)
        }
        BankMode::Simulator => {
            tracing::warn!(
                failure_rate = config.simulator_failure_rate,
                delay_ms = config.simulator_delay_ms,
                "using simulated bank"
            );
            Arc::new(SimulatedBank::new(
                config.simulator_failure_rate,
                Duration::from_millis(config.simulator_delay_ms),
            ))
        }
    };

    let state = AppState {
        store: Arc::new(PgPaymentStore::new(pool)),
        bank,
        jwt: Arc::new(jwt),
        webhook: Arc::new(webhook),
        checkout: Arc::new(CheckoutSettings {
            currency: config.payment_currency.clone(),
            callback_url: config.callback_url(),
        }),
        issuer: issuer.map(Arc::new),
        dev_credentials: config.dev_credentials(),
    };

    let app = app::router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
