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

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating mode selected by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Follow heating windows and tariff rates
    #[default]
    Optimized,
    /// Heat unconditionally until the boost expires
    Boost,
    /// Never heat
    Off,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimized => "optimized",
            Self::Boost => "boost",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimized" => Ok(Self::Optimized),
            "boost" => Ok(Self::Boost),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Current mode together with the boost expiry, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideState {
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OverrideState {
    pub fn optimized() -> Self {
        Self::default()
    }

    /// Boost whose expiry has been reached.
    pub fn is_expired_boost(&self, now: DateTime<Utc>) -> bool {
        self.mode == Mode::Boost && self.expires_at.is_none_or(|expires| now >= expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_mode_parsing() {
        assert_eq!("boost".parse::<Mode>().unwrap(), Mode::Boost);
        assert_eq!(" OFF ".parse::<Mode>().unwrap(), Mode::Off);
        assert!("eco".parse::<Mode>().is_err());
    }

    #[test]
    fn test_boost_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        let state = OverrideState {
            mode: Mode::Boost,
            expires_at: Some(now + Duration::minutes(30)),
        };
        assert!(!state.is_expired_boost(now));
        assert!(state.is_expired_boost(now + Duration::minutes(30)));
        assert!(!OverrideState::optimized().is_expired_boost(now));
    }
}
