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

//! Relay backed by a Home Assistant switch entity.

use std::time::Duration;

use async_trait::async_trait;
use heatwise_core::{Relay, RelayError};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::{FeedError, FeedResult};

#[derive(Clone)]
pub struct HomeAssistantRelay {
    base_url: String,
    token: String,
    entity_id: String,
    client: Client,
}

impl std::fmt::Debug for HomeAssistantRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantRelay")
            .field("base_url", &self.base_url)
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}

impl HomeAssistantRelay {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        let entity_id: String = entity_id.into();
        if !entity_id.contains('.') {
            return Err(FeedError::Config(format!(
                "Invalid entity id '{entity_id}', expected 'domain.object_id'"
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            entity_id,
            client,
        })
    }

    /// Build from configuration values, falling back to `HA_TOKEN` when no
    /// token is configured.
    pub fn from_config(
        base_url: impl Into<String>,
        token: Option<String>,
        entity_id: impl Into<String>,
    ) -> FeedResult<Self> {
        let token = token
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                FeedError::Config(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        let relay = Self::new(base_url, token, entity_id)?;
        info!(
            "Home Assistant relay for {} at {}",
            relay.entity_id, relay.base_url
        );
        Ok(relay)
    }

    /// Service domain taken from the entity id, e.g. `switch` or `input_boolean`.
    fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("switch")
    }

    async fn call(&self, service: &str) -> Result<(), RelayError> {
        let url = format!("{}/api/services/{}/{}", self.base_url, self.domain(), service);
        debug!("Calling {} for {}", url, self.entity_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "entity_id": self.entity_id }))
            .send()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!("Home Assistant {} {}", service, self.entity_id);
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Home Assistant authentication failed");
                Err(RelayError::Rejected("authentication failed".to_owned()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RelayError::Rejected(format!("status {status}: {body}")))
            }
        }
    }
}

#[async_trait]
impl Relay for HomeAssistantRelay {
    fn name(&self) -> &str {
        "home_assistant"
    }

    async fn energize(&self) -> Result<(), RelayError> {
        self.call("turn_on").await
    }

    async fn deenergize(&self) -> Result<(), RelayError> {
        self.call("turn_off").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_energize_calls_turn_on() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/switch/turn_on")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({"entity_id": "switch.water_heater"})))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let relay = HomeAssistantRelay::new(server.url(), "test_token", "switch.water_heater").unwrap();
        relay.energize().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deenergize_uses_entity_domain() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/input_boolean/turn_off")
            .with_status(200)
            .create_async()
            .await;

        let relay =
            HomeAssistantRelay::new(format!("{}/", server.url()), "t", "input_boolean.immersion").unwrap();
        relay.deenergize().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_is_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/services/switch/turn_on")
            .with_status(401)
            .create_async()
            .await;

        let relay = HomeAssistantRelay::new(server.url(), "bad", "switch.water_heater").unwrap();
        let err = relay.energize().await.unwrap_err();
        assert!(matches!(err, RelayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        // nothing listens on the discard port
        let relay = HomeAssistantRelay::new("http://127.0.0.1:9", "t", "switch.water_heater").unwrap();
        let err = relay.energize().await.unwrap_err();
        assert!(matches!(err, RelayError::Unreachable(_)));
    }

    #[test]
    fn test_entity_id_needs_domain() {
        assert!(HomeAssistantRelay::new("http://localhost:8123", "t", "water_heater").is_err());
    }
}
