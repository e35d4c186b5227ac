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
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use heatwise_adapters::MeterPoint;
use heatwise_core::{CostModel, RetryPolicy};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub rate_feed: RateFeedSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateSettings {
    #[serde(default = "default_state_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_heater_power_kw")]
    pub heater_power_kw: f64,
    #[serde(default = "default_baseline_rate")]
    pub baseline_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayKind {
    #[default]
    DryRun,
    HomeAssistant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub kind: RelayKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateFeedSettings {
    #[serde(default = "default_feed_enabled")]
    pub enabled: bool,
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,
    #[serde(default = "default_product_code")]
    pub product_code: String,
    #[serde(default = "default_tariff_code")]
    pub tariff_code: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: u32,
    /// Meter point administration number; with `meter_serial` enables
    /// consumption reads
    #[serde(default)]
    pub mpan: Option<String>,
    #[serde(default)]
    pub meter_serial: Option<String>,
    #[serde(default = "default_consumption_lookback_hours")]
    pub consumption_lookback_hours: u32,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "./data/heatwise.db".to_owned()
}

fn default_retention_days() -> u32 {
    366
}

fn default_state_path() -> String {
    heatwise_core::persistence::DEFAULT_STATE_PATH.to_owned()
}

fn default_timezone() -> String {
    "Europe/London".to_owned()
}

fn default_heater_power_kw() -> f64 {
    3.0
}

fn default_baseline_rate() -> f64 {
    24.5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_feed_enabled() -> bool {
    true
}

fn default_feed_base_url() -> String {
    heatwise_adapters::octopus::DEFAULT_BASE_URL.to_owned()
}

fn default_product_code() -> String {
    "AGILE-FLEX-22-11-25".to_owned()
}

fn default_tariff_code() -> String {
    "E-1R-AGILE-FLEX-22-11-25-B".to_owned()
}

fn default_refresh_interval_secs() -> u64 {
    1800
}

fn default_lookahead_hours() -> u32 {
    24
}

fn default_consumption_lookback_hours() -> u32 {
    48
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            heater_power_kw: default_heater_power_kw(),
            baseline_rate: default_baseline_rate(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            kind: RelayKind::default(),
            base_url: None,
            token: None,
            entity_id: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for RateFeedSettings {
    fn default() -> Self {
        Self {
            enabled: default_feed_enabled(),
            base_url: default_feed_base_url(),
            product_code: default_product_code(),
            tariff_code: default_tariff_code(),
            api_key: None,
            refresh_interval_secs: default_refresh_interval_secs(),
            lookahead_hours: default_lookahead_hours(),
            mpan: None,
            meter_serial: None,
            consumption_lookback_hours: default_consumption_lookback_hours(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be greater than 0");
        }
        if self.database.retention_days < 7 {
            bail!("database.retention_days must be at least 7");
        }
        self.timezone()?;
        if !self.engine.heater_power_kw.is_finite() || self.engine.heater_power_kw <= 0.0 {
            bail!("engine.heater_power_kw must be positive");
        }
        if !self.engine.baseline_rate.is_finite() || self.engine.baseline_rate < 0.0 {
            bail!("engine.baseline_rate must not be negative");
        }
        if self.relay.kind == RelayKind::HomeAssistant {
            if self.relay.base_url.as_deref().is_none_or(str::is_empty) {
                bail!("relay.base_url must be set for the home_assistant relay");
            }
            if self.relay.entity_id.as_deref().is_none_or(str::is_empty) {
                bail!("relay.entity_id must be set for the home_assistant relay");
            }
        }
        if self.rate_feed.refresh_interval_secs < 60 {
            bail!("rate_feed.refresh_interval_secs must be at least 60");
        }
        let mpan = self.rate_feed.mpan.as_deref().filter(|s| !s.is_empty());
        let serial = self.rate_feed.meter_serial.as_deref().filter(|s| !s.is_empty());
        if mpan.is_some() != serial.is_some() {
            bail!("rate_feed.mpan and rate_feed.meter_serial must be set together");
        }
        if self.rate_feed.consumption_lookback_hours == 0 {
            bail!("rate_feed.consumption_lookback_hours must be greater than 0");
        }
        Ok(())
    }

    /// Meter to read consumption from, when one is configured.
    pub fn meter_point(&self) -> Option<MeterPoint> {
        let mpan = self.rate_feed.mpan.as_deref().filter(|s| !s.is_empty())?;
        let serial = self.rate_feed.meter_serial.as_deref().filter(|s| !s.is_empty())?;
        Some(MeterPoint {
            mpan: mpan.to_owned(),
            serial_number: serial.to_owned(),
        })
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.engine
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("engine.timezone '{}' is not valid: {e}", self.engine.timezone))
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel {
            heater_power_kw: self.engine.heater_power_kw,
            baseline_rate: self.engine.baseline_rate,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.relay.max_retries,
            initial_delay: Duration::from_millis(self.relay.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.retention_days, 366);
        assert_eq!(config.relay.kind, RelayKind::DryRun);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::London);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.cost_model(), CostModel::default());
        assert_eq!(config.meter_point(), None);
    }

    #[test]
    fn test_parses_sections() {
        let config = ServerConfig::from_toml(
            r#"
            [server]
            port = 9090

            [engine]
            timezone = "Europe/Prague"
            heater_power_kw = 2.0

            [relay]
            kind = "home_assistant"
            base_url = "http://ha.local:8123"
            entity_id = "switch.boiler"
            max_retries = 5

            [rate_feed]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.relay.kind, RelayKind::HomeAssistant);
        assert_eq!(config.relay.max_retries, 5);
        assert!(!config.rate_feed.enabled);
        assert_eq!(config.rate_feed.refresh_interval_secs, 1800);
        assert!((config.cost_model().heater_power_kw - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_failures() {
        assert!(ServerConfig::from_toml("[engine]\ntimezone = \"Mars/Olympus\"").is_err());
        assert!(ServerConfig::from_toml("[engine]\nheater_power_kw = 0.0").is_err());
        assert!(ServerConfig::from_toml("[database]\nretention_days = 3").is_err());
        assert!(ServerConfig::from_toml("[relay]\nkind = \"home_assistant\"").is_err());
        assert!(ServerConfig::from_toml("[rate_feed]\nrefresh_interval_secs = 5").is_err());
        assert!(ServerConfig::from_toml("[server]\nport = 0").is_err());
        assert!(ServerConfig::from_toml("[rate_feed]\nmpan = \"2000012345678\"").is_err());
    }

    #[test]
    fn test_meter_point() {
        let config = ServerConfig::from_toml(
            r#"
            [rate_feed]
            mpan = "2000012345678"
            meter_serial = "21L4381234"
            "#,
        )
        .unwrap();
        let meter = config.meter_point().unwrap();
        assert_eq!(meter.mpan, "2000012345678");
        assert_eq!(meter.serial_number, "21L4381234");
        assert_eq!(config.rate_feed.consumption_lookback_hours, 48);
    }
}
