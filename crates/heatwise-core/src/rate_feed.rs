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

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heatwise_types::{ConsumptionSample, RateSlot};

/// External source of tariff slots.
#[async_trait]
pub trait RateFeed: Send + Sync + std::fmt::Debug {
    /// Tag recorded with every slot this feed delivers.
    fn source(&self) -> &str;

    /// Slots covering `[from, to)`, ordered by start.
    async fn fetch_rates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<RateSlot>>;
}

/// External source of metered consumption.
#[async_trait]
pub trait ConsumptionFeed: Send + Sync + std::fmt::Debug {
    /// Meter intervals starting in `[from, to)`, ordered by start.
    async fn fetch_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionSample>>;
}
