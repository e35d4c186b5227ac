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

//! Heating windows and system settings.
//!
//! Windows are defined in local wall-clock time and may run past midnight.
//! An instance belongs to the weekday it starts on, so a Monday 23:00 window
//! lasting two hours is still active at 00:30 on Tuesday.

use std::collections::HashSet;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use heatwise_types::{HeatingWindow, SystemSettings};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Granularity of window durations and minimum runs.
const WINDOW_STEP_MINUTES: u32 = 15;
const MAX_WINDOW_MINUTES: u32 = 180;
const SECONDS_PER_DAY: i64 = 86_400;

/// One concrete occurrence of a heating window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInstance {
    pub window: HeatingWindow,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowInstance {
    pub fn required_minutes(&self) -> i64 {
        i64::from(self.window.required_minutes())
    }
}

/// Resolve a local wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times skipped by a DST jump are read as if no offset applied.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        LocalResult::None => tz.from_utc_datetime(&local).with_timezone(&Utc),
    }
}

/// Whether an instance of `window` covers `time` on `day`.
pub fn window_covers(window: &HeatingWindow, day: Weekday, time: NaiveTime) -> bool {
    let start = i64::from(window.start_time.num_seconds_from_midnight());
    let end = start + i64::from(window.duration_minutes) * 60;
    let t = i64::from(time.num_seconds_from_midnight());

    if start <= t && t < end {
        window.days_of_week.contains(day)
    } else if end > SECONDS_PER_DAY && t < end - SECONDS_PER_DAY {
        window.days_of_week.contains(day.pred())
    } else {
        false
    }
}

/// Instances of enabled windows starting on local dates `first..=last`.
fn instances_on_dates(
    windows: &[HeatingWindow],
    tz: Tz,
    first: NaiveDate,
    last: NaiveDate,
) -> impl Iterator<Item = WindowInstance> + '_ {
    first
        .iter_days()
        .take_while(move |date| *date <= last)
        .flat_map(move |date| {
            windows
                .iter()
                .filter(move |w| w.enabled && w.days_of_week.contains(date.weekday()))
                .map(move |w| {
                    let start = date.and_time(w.start_time);
                    WindowInstance {
                        window: w.clone(),
                        start: local_to_utc(tz, start),
                        end: local_to_utc(tz, start + w.duration()),
                    }
                })
        })
}

/// Instances of enabled windows overlapping `[from, to)`, ordered by start.
///
/// A window starting between slot boundaries still overlaps the slot that
/// contains its start, so deciding over the slot interval sees it.
pub fn instances_overlapping(
    windows: &[HeatingWindow],
    tz: Tz,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<WindowInstance> {
    if to <= from {
        return Vec::new();
    }
    let first = from.with_timezone(&tz).date_naive() - Duration::days(1);
    let last = to.with_timezone(&tz).date_naive();

    let mut instances: Vec<WindowInstance> = instances_on_dates(windows, tz, first, last)
        .filter(|instance| instance.start < to && from < instance.end)
        .collect();
    instances.sort_by_key(|instance| instance.start);
    instances
}

/// Instances of enabled windows starting in `[from, to)`, ordered by start.
pub fn instances_starting_between(
    windows: &[HeatingWindow],
    tz: Tz,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<WindowInstance> {
    if to <= from {
        return Vec::new();
    }
    let first = from.with_timezone(&tz).date_naive() - Duration::days(1);
    let last = to.with_timezone(&tz).date_naive();

    let mut instances: Vec<WindowInstance> = instances_on_dates(windows, tz, first, last)
        .filter(|instance| from <= instance.start && instance.start < to)
        .collect();
    instances.sort_by_key(|instance| instance.start);
    instances
}

pub fn validate_window(window: &HeatingWindow) -> EngineResult<()> {
    let invalid = |reason: String| EngineError::InvalidWindow {
        id: window.id,
        reason,
    };

    let duration = window.duration_minutes;
    if duration == 0 || duration > MAX_WINDOW_MINUTES || duration % WINDOW_STEP_MINUTES != 0 {
        return Err(invalid(format!(
            "duration must be a multiple of {WINDOW_STEP_MINUTES} between {WINDOW_STEP_MINUTES} and {MAX_WINDOW_MINUTES} minutes, got {duration}"
        )));
    }
    if !window.days_of_week.is_valid() {
        return Err(invalid("days must be between 0 (Monday) and 6 (Sunday)".to_owned()));
    }
    if window.enabled && window.days_of_week.is_empty() {
        return Err(invalid("an enabled window needs at least one day".to_owned()));
    }
    if let Some(min_run) = window.min_run_minutes
        && (min_run < WINDOW_STEP_MINUTES || min_run > duration || min_run % WINDOW_STEP_MINUTES != 0)
    {
        return Err(invalid(format!(
            "minimum run must be a multiple of {WINDOW_STEP_MINUTES} between {WINDOW_STEP_MINUTES} and {duration} minutes, got {min_run}"
        )));
    }
    Ok(())
}

pub fn validate_settings(settings: &SystemSettings) -> EngineResult<()> {
    let values = [
        settings.min_temperature,
        settings.max_temperature,
        settings.cheap_threshold,
        settings.expensive_threshold,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidSettings(
            "temperatures and thresholds must be finite numbers".to_owned(),
        ));
    }
    if settings.min_temperature >= settings.max_temperature {
        return Err(EngineError::InvalidSettings(format!(
            "min_temperature ({}) must be below max_temperature ({})",
            settings.min_temperature, settings.max_temperature
        )));
    }
    if settings.cheap_threshold >= settings.expensive_threshold {
        return Err(EngineError::InvalidSettings(format!(
            "cheap_threshold ({}) must be below expensive_threshold ({})",
            settings.cheap_threshold, settings.expensive_threshold
        )));
    }
    if settings.peak_start >= settings.peak_end {
        return Err(EngineError::InvalidSettings(format!(
            "peak_start ({}) must be before peak_end ({})",
            settings.peak_start.format("%H:%M"),
            settings.peak_end.format("%H:%M")
        )));
    }
    Ok(())
}

/// Validated store of heating windows and system settings.
#[derive(Debug)]
pub struct ScheduleConfig {
    timezone: Tz,
    windows: RwLock<Vec<HeatingWindow>>,
    settings: RwLock<SystemSettings>,
}

impl ScheduleConfig {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            windows: RwLock::new(Vec::new()),
            settings: RwLock::new(SystemSettings::default()),
        }
    }

    /// Build from previously persisted values, validating them as an update would.
    pub fn with_state(
        timezone: Tz,
        windows: Vec<HeatingWindow>,
        settings: SystemSettings,
    ) -> EngineResult<Self> {
        let config = Self::new(timezone);
        config.replace_windows(windows)?;
        config.update_settings(settings)?;
        Ok(config)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn list_windows(&self) -> Vec<HeatingWindow> {
        self.windows.read().clone()
    }

    /// Replace the whole window set. Nothing changes if any window is invalid.
    pub fn replace_windows(&self, windows: Vec<HeatingWindow>) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for window in &windows {
            validate_window(window)?;
            if !seen.insert(window.id) {
                return Err(EngineError::InvalidWindow {
                    id: window.id,
                    reason: "duplicate window id".to_owned(),
                });
            }
        }

        let count = windows.len();
        *self.windows.write() = windows;
        info!(count, "Heating windows replaced");
        Ok(())
    }

    pub fn get_settings(&self) -> SystemSettings {
        self.settings.read().clone()
    }

    /// Replace the settings record. Prior settings stay in place on error.
    pub fn update_settings(&self, settings: SystemSettings) -> EngineResult<()> {
        validate_settings(&settings)?;
        *self.settings.write() = settings;
        info!("System settings updated");
        Ok(())
    }

    /// Enabled windows with an instance covering `time` on `day`.
    pub fn active_windows_for(&self, day: Weekday, time: NaiveTime) -> Vec<HeatingWindow> {
        self.windows
            .read()
            .iter()
            .filter(|w| w.enabled && window_covers(w, day, time))
            .cloned()
            .collect()
    }
}
