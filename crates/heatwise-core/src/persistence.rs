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

//! Persistence of user-editable engine state.
//!
//! Heating windows, system settings and the mode override are kept in one
//! JSON document so they survive restarts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use heatwise_types::{HeatingWindow, OverrideState, SystemSettings};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_STATE_PATH: &str = "./data/state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub windows: Vec<HeatingWindow>,
    #[serde(default)]
    pub settings: SystemSettings,
    #[serde(default)]
    pub mode: OverrideState,
}

impl EngineState {
    /// Replace a Boost that has already run out with Optimized.
    /// Returns `true` if the mode changed.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        if self.mode.is_expired_boost(now) {
            self.mode = OverrideState::optimized();
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct StatePersistence {
    state_path: PathBuf,
}

impl StatePersistence {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }

    /// Load state from disk, falling back to defaults when the file is missing.
    pub fn load(&self) -> Result<EngineState> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Result<EngineState> {
        if !self.state_path.exists() {
            info!(
                "Engine state file not found at {}, using defaults",
                self.state_path.display()
            );
            return Ok(EngineState::default());
        }

        let contents = fs::read_to_string(&self.state_path).with_context(|| {
            format!("Failed to read engine state from {}", self.state_path.display())
        })?;

        let mut state: EngineState = serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse engine state from {}", self.state_path.display())
        })?;

        if state.normalize(now) {
            info!("Stored boost has expired, starting in optimized mode");
        }

        info!(
            "Loaded engine state: mode={}, windows={}",
            state.mode.mode,
            state.windows.len()
        );

        Ok(state)
    }

    /// Save state with an atomic temp-file write and rename.
    pub fn save(&self, state: &EngineState) -> Result<()> {
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize engine state")?;

        let temp_path = self.state_path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.state_path).with_context(|| {
            format!("Failed to rename temp file to {}", self.state_path.display())
        })?;

        info!(
            "Saved engine state to {} (mode={}, {} windows)",
            self.state_path.display(),
            state.mode.mode,
            state.windows.len()
        );

        Ok(())
    }
}

impl Default for StatePersistence {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use heatwise_types::{Mode, Weekdays};
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_file() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("missing.json"));

        let state = persistence.load().unwrap();
        assert!(state.windows.is_empty());
        assert_eq!(state.settings, SystemSettings::default());
        assert_eq!(state.mode.mode, Mode::Optimized);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("nested").join("state.json"));
        let now = Utc::now();

        let state = EngineState {
            windows: vec![HeatingWindow {
                id: 7,
                start_time: NaiveTime::from_hms_opt(5, 30, 0).unwrap(),
                duration_minutes: 90,
                min_run_minutes: Some(45),
                days_of_week: Weekdays::all(),
                enabled: true,
            }],
            settings: SystemSettings::default(),
            mode: OverrideState {
                mode: Mode::Boost,
                expires_at: Some(now + Duration::hours(1)),
            },
        };

        persistence.save(&state).unwrap();
        assert!(persistence.exists());
        assert!(!persistence.path().with_extension("tmp").exists());

        let loaded = persistence.load_at(now).unwrap();
        assert_eq!(loaded.windows, state.windows);
        assert_eq!(loaded.mode.mode, Mode::Boost);
    }

    #[test]
    fn test_expired_boost_normalized_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let now = Utc::now();

        let state = EngineState {
            mode: OverrideState {
                mode: Mode::Boost,
                expires_at: Some(now - Duration::minutes(5)),
            },
            ..Default::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

        let loaded = StatePersistence::new(&path).load_at(now).unwrap();
        assert_eq!(loaded.mode, OverrideState::optimized());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(StatePersistence::new(&path).load().is_err());
    }
}
