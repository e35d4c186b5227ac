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

use std::collections::BTreeSet;

use chrono::{Duration, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::rates::RateClass;
use crate::time_format;

/// Set of weekdays, stored as indices with 0 = Monday .. 6 = Sunday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weekdays(BTreeSet<u8>);

impl Weekdays {
    pub fn all() -> Self {
        Self((0..7).collect())
    }

    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self(
            days.into_iter()
                .map(|d| d.num_days_from_monday() as u8)
                .collect(),
        )
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&(day.num_days_from_monday() as u8))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All stored indices are real weekdays.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|d| *d < 7)
    }

    pub fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

/// A recurring local-time interval during which the heater may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatingWindow {
    pub id: u32,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(alias = "duration")]
    pub duration_minutes: u32,
    /// Minimum heating the window must deliver; defaults to the whole window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_run_minutes: Option<u32>,
    #[serde(alias = "days")]
    pub days_of_week: Weekdays,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl HeatingWindow {
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Heating minutes each instance of this window has to deliver.
    pub fn required_minutes(&self) -> u32 {
        self.min_run_minutes.unwrap_or(self.duration_minutes)
    }

    /// The window runs past local midnight into the next day.
    pub fn wraps_midnight(&self) -> bool {
        let start = i64::from(self.start_time.num_seconds_from_midnight()) / 60;
        start + i64::from(self.duration_minutes) > 24 * 60
    }
}

/// Household tuning values shared by the decision engine and the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub cheap_threshold: f64,
    pub expensive_threshold: f64,
    #[serde(with = "time_format")]
    pub peak_start: NaiveTime,
    #[serde(with = "time_format")]
    pub peak_end: NaiveTime,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            min_temperature: 50.0,
            max_temperature: 60.0,
            cheap_threshold: 15.0,
            expensive_threshold: 25.0,
            peak_start: NaiveTime::MIN + Duration::hours(16),
            peak_end: NaiveTime::MIN + Duration::hours(19),
        }
    }
}

impl SystemSettings {
    pub fn classify(&self, rate: f64) -> RateClass {
        RateClass::classify(rate, self.cheap_threshold, self.expensive_threshold)
    }

    /// Peak hours are the half-open local interval `[peak_start, peak_end)`.
    pub fn is_peak(&self, time: NaiveTime) -> bool {
        self.peak_start <= time && time < self.peak_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_accepts_short_field_names() {
        let json = r#"{"id":1,"start_time":"06:00","duration":60,"days":[0,1,2,3,4],"enabled":true}"#;
        let window: HeatingWindow = serde_json::from_str(json).unwrap();

        assert_eq!(window.duration_minutes, 60);
        assert_eq!(window.required_minutes(), 60);
        assert!(window.days_of_week.contains(Weekday::Mon));
        assert!(!window.days_of_week.contains(Weekday::Sat));

        let out = serde_json::to_value(&window).unwrap();
        assert_eq!(out["start_time"], "06:00");
        assert_eq!(out["days_of_week"], serde_json::json!([0, 1, 2, 3, 4]));
        assert!(out.get("min_run_minutes").is_none());
    }

    #[test]
    fn test_window_wrap_detection() {
        let mut window = HeatingWindow {
            id: 1,
            start_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            duration_minutes: 60,
            min_run_minutes: None,
            days_of_week: Weekdays::all(),
            enabled: true,
        };
        assert!(!window.wraps_midnight());
        window.duration_minutes = 120;
        assert!(window.wraps_midnight());
    }

    #[test]
    fn test_peak_is_half_open() {
        let settings = SystemSettings::default();
        assert!(!settings.is_peak(NaiveTime::from_hms_opt(15, 59, 0).unwrap()));
        assert!(settings.is_peak(NaiveTime::from_hms_opt(16, 0, 0).unwrap()));
        assert!(settings.is_peak(NaiveTime::from_hms_opt(18, 30, 0).unwrap()));
        assert!(!settings.is_peak(NaiveTime::from_hms_opt(19, 0, 0).unwrap()));
    }
}
