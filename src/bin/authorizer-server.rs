//! HTTP front for the authorizer.
//!
//! Configuration comes from the TOML file named by `AUTHORIZER_CONFIG`, or
//! from the environment when that is unset. Listens on
//! `AUTHORIZER_BIND_ADDR` (default `0.0.0.0:8080`).

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use actions_oidc_authorizer::axum_integration::router;
use actions_oidc_authorizer::{load_config, Authorizer, PolicyConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("AUTHORIZER_CONFIG") {
        Ok(path) => load_config(&path)
            .and_then(|file| file.policy_config())
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => PolicyConfig::from_env().context("loading configuration from environment")?,
    };

    tracing::info!(
        issuer = %config.issuer,
        audience = %config.audience,
        repository = %config.expected_repository(),
        required_claims = config.required_claims.len(),
        "authorizer configured"
    );

    let authorizer = Arc::new(Authorizer::new(config)?);
    let bind_addr = std::env::var("AUTHORIZER_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router(authorizer)).await?;
    Ok(())
}
