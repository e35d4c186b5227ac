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

use chrono::{DateTime, Duration, Utc};
use heatwise_types::{Mode, OverrideState};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Holds the user's mode override. Boost expiry is passive: it is applied by
/// `expire_if_due`, which the control loop calls on every tick.
#[derive(Debug, Default)]
pub struct ModeController {
    state: RwLock<OverrideState>,
}

impl ModeController {
    pub fn new(initial: OverrideState) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }

    pub fn current(&self) -> OverrideState {
        *self.state.read()
    }

    /// Switch mode. Boost needs a positive duration and restarts its clock
    /// when repeated; other modes ignore the duration.
    pub fn set_mode(
        &self,
        mode: Mode,
        boost_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> EngineResult<OverrideState> {
        let next = match mode {
            Mode::Boost => {
                let minutes = boost_minutes.ok_or_else(|| {
                    EngineError::InvalidDuration("boost requires a duration in minutes".to_owned())
                })?;
                if minutes <= 0 {
                    return Err(EngineError::InvalidDuration(format!(
                        "boost duration must be positive, got {minutes}"
                    )));
                }
                let expires_at = Duration::try_minutes(minutes)
                    .and_then(|duration| now.checked_add_signed(duration))
                    .ok_or_else(|| {
                        EngineError::InvalidDuration(format!("boost duration {minutes} is too large"))
                    })?;
                OverrideState {
                    mode,
                    expires_at: Some(expires_at),
                }
            }
            Mode::Optimized | Mode::Off => OverrideState {
                mode,
                expires_at: None,
            },
        };

        *self.state.write() = next;
        match next.expires_at {
            Some(expires_at) => info!(mode = %next.mode, %expires_at, "Mode changed"),
            None => info!(mode = %next.mode, "Mode changed"),
        }
        Ok(next)
    }

    /// Return to Optimized if a Boost has run out. Returns the new state
    /// when a transition happened.
    pub fn expire_if_due(&self, now: DateTime<Utc>) -> Option<OverrideState> {
        let mut state = self.state.write();
        if !state.is_expired_boost(now) {
            return None;
        }
        *state = OverrideState::optimized();
        info!("Boost expired, returning to optimized mode");
        Some(*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_boost_sets_expiry_and_expires() {
        let controller = ModeController::default();
        let state = controller.set_mode(Mode::Boost, Some(30), now()).unwrap();
        assert_eq!(state.expires_at, Some(now() + Duration::minutes(30)));

        assert!(controller.expire_if_due(now() + Duration::minutes(29)).is_none());
        assert_eq!(controller.current().mode, Mode::Boost);

        let expired = controller.expire_if_due(now() + Duration::minutes(30)).unwrap();
        assert_eq!(expired, OverrideState::optimized());
        assert_eq!(controller.current().mode, Mode::Optimized);
    }

    #[test]
    fn test_repeated_boost_restarts_clock() {
        let controller = ModeController::default();
        controller.set_mode(Mode::Boost, Some(30), now()).unwrap();
        let later = now() + Duration::minutes(20);
        let state = controller.set_mode(Mode::Boost, Some(30), later).unwrap();
        assert_eq!(state.expires_at, Some(later + Duration::minutes(30)));
    }

    #[test]
    fn test_invalid_boost_duration_leaves_state() {
        let controller = ModeController::default();
        controller.set_mode(Mode::Off, None, now()).unwrap();

        for minutes in [None, Some(0), Some(-5)] {
            let err = controller.set_mode(Mode::Boost, minutes, now()).unwrap_err();
            assert!(matches!(err, EngineError::InvalidDuration(_)));
        }
        assert_eq!(controller.current().mode, Mode::Off);
    }

    #[test]
    fn test_off_and_optimized_clear_expiry() {
        let controller = ModeController::default();
        controller.set_mode(Mode::Boost, Some(60), now()).unwrap();
        let state = controller.set_mode(Mode::Off, Some(60), now()).unwrap();
        assert_eq!(state.expires_at, None);
        assert!(controller.expire_if_due(now() + Duration::days(1)).is_none());
        assert_eq!(controller.current().mode, Mode::Off);
    }
}
