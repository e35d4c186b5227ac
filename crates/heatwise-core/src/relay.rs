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

//! Heater relay abstraction and the retry policy used to drive it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay unreachable: {0}")]
    Unreachable(String),

    #[error("Relay rejected command: {0}")]
    Rejected(String),
}

/// The physical switch in front of the immersion heater.
#[async_trait]
pub trait Relay: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn energize(&self) -> Result<(), RelayError>;

    async fn deenergize(&self) -> Result<(), RelayError>;
}

/// Initial attempt plus `max_retries` retries, doubling the delay each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Command the relay, retrying with exponential backoff. Returns the number
/// of attempts used on success, or the last error once retries run out.
pub async fn apply_with_retry(
    relay: &dyn Relay,
    heating: bool,
    policy: &RetryPolicy,
) -> Result<u32, RelayError> {
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;
        let result = if heating {
            relay.energize().await
        } else {
            relay.deenergize().await
        };

        match result {
            Ok(()) => return Ok(attempts),
            Err(e) if attempts > policy.max_retries => {
                error!(
                    relay = relay.name(),
                    heating, "Relay command failed after {} attempts: {}", attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    relay = relay.name(),
                    heating,
                    "Relay command failed (attempt {}/{}): {}. Retrying in {:?}",
                    attempts,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}
