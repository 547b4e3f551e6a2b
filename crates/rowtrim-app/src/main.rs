// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rowtrim — blank-row removal service
//
// Entry point. Initialises logging, loads configuration, and runs the HTTP
// server until Ctrl-C.
//
// Usage: rowtrim [CONFIG.json]
// The config path may also be given through ROWTRIM_CONFIG.

use std::path::PathBuf;
use std::process::ExitCode;

use rowtrim_core::AppConfig;
use rowtrim_core::error::Result;
use rowtrim_server::RowtrimServer;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Rowtrim starting");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Rowtrim exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = load_config()?;
    let mut server = RowtrimServer::new(config.server.clone(), config.filter);
    server.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }

    server.stop().await
}

fn load_config() -> Result<AppConfig> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("ROWTRIM_CONFIG").map(PathBuf::from));

    let mut config = AppConfig::load(path.as_deref())?;
    config.apply_env_overrides()?;
    config.validate()?;

    tracing::info!(
        config = ?path,
        port = config.server.port,
        origins = ?config.server.allowed_origins,
        "configuration loaded"
    );
    Ok(config)
}
