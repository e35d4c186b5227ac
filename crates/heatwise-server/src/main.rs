// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Heatwise.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::path::Path;

use anyhow::Result;
use heatwise_server::config::ServerConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "heatwise.toml";
const DEFAULT_LOG_FILTER: &str = "heatwise_server=info,heatwise_core=info,heatwise_adapters=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let config = if Path::new(&config_path).exists() {
        ServerConfig::from_file(&config_path)?
    } else {
        info!("Config file {} not found, using defaults", config_path);
        ServerConfig::default()
    };

    info!("Starting Heatwise v{}", env!("CARGO_PKG_VERSION"));
    heatwise_server::run(&config).await
}
