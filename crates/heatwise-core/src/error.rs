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

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by the engine's validating operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid rate slot starting {start}: {reason}")]
    InvalidSlot {
        start: DateTime<Utc>,
        reason: String,
    },

    #[error("Invalid heating window {id}: {reason}")]
    InvalidWindow { id: u32, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid boost duration: {0}")]
    InvalidDuration(String),
}

impl EngineError {
    /// Stable identifier used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSlot { .. } => "INVALID_SLOT",
            Self::InvalidWindow { .. } => "INVALID_WINDOW",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::InvalidDuration(_) => "INVALID_DURATION",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
