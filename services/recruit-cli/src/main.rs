//! Recruit platform API client
//!
//! Sends one request through the session coordinator and prints the JSON
//! response. CSRF tokens, retries and session renewal happen underneath;
//! if the session cannot be recovered the login redirect target is printed
//! instead of navigating.

mod cli;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use common::Config;
use session_client::{ApiResponse, RecordingNavigator, SessionCoordinator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_response(response: &ApiResponse) -> Result<()> {
    match response.json::<serde_json::Value>() {
        Ok(body) => println!(
            "{}",
            serde_json::to_string_pretty(&body).context("failed to format response")?
        ),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let prometheus = metrics::install_recorder()?;

    let navigator = Arc::new(RecordingNavigator::at(cli.page.clone()));
    let coordinator = SessionCoordinator::init(&config, navigator.clone())
        .await
        .context("failed to initialize session client")?;

    if let Some(email) = &cli.login {
        let password = cli
            .password
            .as_deref()
            .context("RECRUIT_PASSWORD or --password must be set when using --login")?;
        coordinator
            .login(email, password)
            .await
            .context("login failed")?;
    }

    let result = coordinator.send(cli.request()).await;
    match &result {
        Ok(response) => print_response(response)?,
        Err(err) => {
            warn!(kind = err.kind.label(), status = ?err.status, "request failed");
            eprintln!(
                "{}",
                serde_json::to_string_pretty(err).context("failed to format error")?
            );
        }
    }

    for target in navigator.visited() {
        eprintln!("redirect: {target}");
    }
    if cli.metrics {
        eprint!("{}", prometheus.render());
    }

    result.map(|_| ()).context("request failed")
}
