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

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use heatwise_core::{Relay, RelayError};
use tracing::info;

/// Relay that only logs commands. Used when no hardware is configured.
#[derive(Debug, Default)]
pub struct DryRunRelay {
    energized: AtomicBool,
}

impl DryRunRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded state.
    pub fn is_energized(&self) -> bool {
        self.energized.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Relay for DryRunRelay {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn energize(&self) -> Result<(), RelayError> {
        if !self.energized.swap(true, Ordering::Relaxed) {
            info!("[dry run] heater relay ON");
        }
        Ok(())
    }

    async fn deenergize(&self) -> Result<(), RelayError> {
        if self.energized.swap(false, Ordering::Relaxed) {
            info!("[dry run] heater relay OFF");
        }
        Ok(())
    }
}
