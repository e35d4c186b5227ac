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

//! Read-only analytics over recorded decisions and stored rates.
//!
//! Every view covers the period ending at the given instant. Empty periods
//! yield zero-valued results rather than errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use heatwise_types::{
    DecisionReason, DecisionRecord, Mode, Period, RateClass, slot_start, slot_width,
};
use serde::Serialize;

use crate::consumption::ConsumptionStore;
use crate::cost::CostModel;
use crate::decision_log::DecisionLog;
use crate::rate_store::RateStore;
use crate::schedule::{ScheduleConfig, instances_starting_between, local_to_utc};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub period: Period,
    pub total_savings: f64,
    pub average_rate: f64,
    pub heating_duration_minutes: i64,
    pub efficiency: f64,
}

/// Headline figures for the dashboard's statistics card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsView {
    /// Average heated minutes per day over the last week
    pub avg_duration: f64,
    /// Savings since the start of the local calendar year
    pub savings: f64,
    pub current_week_costs: f64,
    pub current_month_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePoint {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit_rate: f64,
    pub class: RateClass,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageDay {
    pub date: NaiveDate,
    pub heating_minutes: i64,
    pub heated_slots: u32,
    /// Heater energy implied by the recorded decisions
    pub estimated_kwh: f64,
    /// Whole-supply import read from the meter, when readings exist for the day
    pub metered_kwh: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostDay {
    pub date: NaiveDate,
    pub estimated_cost: f64,
    pub baseline_cost: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourPattern {
    pub hour: u32,
    pub heating_minutes: i64,
    pub average_rate: Option<f64>,
}

/// Column names of the CSV export, in field order.
pub const EXPORT_COLUMNS: [&str; 10] = [
    "slot_start",
    "slot_end",
    "heating",
    "rate",
    "rate_class",
    "mode",
    "reason",
    "estimated_cost",
    "baseline_cost",
    "savings",
];

/// One exported slot: the recorded decision joined with its rate class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub heating: bool,
    pub rate: Option<f64>,
    pub rate_class: Option<RateClass>,
    pub mode: Mode,
    pub reason: DecisionReason,
    pub estimated_cost: f64,
    pub baseline_cost: f64,
    pub savings: f64,
}

#[derive(Debug)]
pub struct StatisticsAggregator {
    rates: Arc<RateStore>,
    log: Arc<dyn DecisionLog>,
    schedule: Arc<ScheduleConfig>,
    consumption: Option<Arc<ConsumptionStore>>,
    costs: CostModel,
}

impl StatisticsAggregator {
    pub fn new(rates: Arc<RateStore>, log: Arc<dyn DecisionLog>, schedule: Arc<ScheduleConfig>) -> Self {
        Self {
            rates,
            log,
            schedule,
            consumption: None,
            costs: CostModel::default(),
        }
    }

    /// Report meter readings next to the estimates in the usage history.
    pub fn with_consumption(mut self, consumption: Arc<ConsumptionStore>) -> Self {
        self.consumption = Some(consumption);
        self
    }

    pub fn with_costs(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    /// Records for slots starting between `from` and the slot containing `now`.
    fn records_since(&self, from: DateTime<Utc>, now: DateTime<Utc>) -> Result<Vec<DecisionRecord>> {
        self.log
            .records_between(from, slot_start(now) + slot_width())
            .context("Failed to read decision records")
    }

    fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.schedule.timezone()).date_naive()
    }

    /// Every local date in the period, oldest first.
    fn dates_in(&self, period: Period, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let first = self.local_date(period.start_from(now));
        let last = self.local_date(now);
        first.iter_days().take_while(|d| *d <= last).collect()
    }

    pub fn summary(&self, period: Period, now: DateTime<Utc>) -> Result<Summary> {
        let from = period.start_from(now);
        let records = self.records_since(from, now)?;

        let total_savings = records.iter().map(DecisionRecord::savings).sum();
        let heating_duration_minutes = heated_minutes(&records);

        let required: i64 = instances_starting_between(
            &self.schedule.list_windows(),
            self.schedule.timezone(),
            from,
            now,
        )
        .iter()
        .map(|instance| instance.required_minutes())
        .sum();

        #[expect(clippy::cast_precision_loss, reason = "minute counts are small")]
        let efficiency = if required == 0 {
            0.0
        } else {
            (heating_duration_minutes as f64 / required as f64 * 100.0).min(100.0)
        };

        Ok(Summary {
            period,
            total_savings,
            average_rate: self.rates.average_rate(period, now).unwrap_or(0.0),
            heating_duration_minutes,
            efficiency,
        })
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> Result<StatisticsView> {
        let tz = self.schedule.timezone();
        let year_start = self
            .local_date(now)
            .with_ordinal(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(now, |midnight| local_to_utc(tz, midnight));

        let week_start = Period::Week.start_from(now);
        let month_start = Period::Month.start_from(now);
        let year = self.records_since(year_start.min(month_start), now)?;

        let week: Vec<&DecisionRecord> =
            year.iter().filter(|r| r.slot_start >= week_start).collect();

        #[expect(clippy::cast_precision_loss, reason = "minute counts are small")]
        let avg_duration = week
            .iter()
            .filter(|r| r.heating)
            .map(|r| (r.slot_end - r.slot_start).num_minutes())
            .sum::<i64>() as f64
            / 7.0;

        Ok(StatisticsView {
            avg_duration,
            savings: year
                .iter()
                .filter(|r| r.slot_start >= year_start)
                .map(DecisionRecord::savings)
                .sum(),
            current_week_costs: week.iter().map(|r| r.estimated_cost).sum(),
            current_month_costs: year
                .iter()
                .filter(|r| r.slot_start >= month_start)
                .map(|r| r.estimated_cost)
                .sum(),
        })
    }

    /// Stored rates in the period, each tagged with its class under the
    /// current thresholds.
    pub fn rate_history(&self, period: Period, now: DateTime<Utc>) -> Vec<RatePoint> {
        let settings = self.schedule.get_settings();
        self.rates
            .history(period, now)
            .into_iter()
            .map(|slot| RatePoint {
                start: slot.start,
                end: slot.end,
                unit_rate: slot.unit_rate,
                class: settings.classify(slot.unit_rate),
            })
            .collect()
    }

    pub fn usage_history(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<UsageDay>> {
        let mut days: BTreeMap<NaiveDate, UsageDay> = self
            .dates_in(period, now)
            .into_iter()
            .map(|date| (date, UsageDay { date, ..Default::default() }))
            .collect();

        for record in self.records_since(period.start_from(now), now)? {
            if !record.heating {
                continue;
            }
            let minutes = (record.slot_end - record.slot_start).num_minutes();
            let date = self.local_date(record.slot_start);
            let day = days.entry(date).or_insert_with(|| UsageDay {
                date,
                ..Default::default()
            });
            day.heating_minutes += minutes;
            day.heated_slots += 1;
            #[expect(clippy::cast_precision_loss, reason = "minute counts are small")]
            let hours = minutes as f64 / 60.0;
            day.estimated_kwh += self.costs.heater_power_kw * hours;
        }

        if let Some(consumption) = &self.consumption {
            for sample in consumption.between(period.start_from(now), now) {
                let date = self.local_date(sample.start);
                if let Some(day) = days.get_mut(&date) {
                    *day.metered_kwh.get_or_insert(0.0) += sample.kwh;
                }
            }
        }

        Ok(days.into_values().collect())
    }

    pub fn cost_history(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<CostDay>> {
        let mut days: BTreeMap<NaiveDate, CostDay> = self
            .dates_in(period, now)
            .into_iter()
            .map(|date| (date, CostDay { date, ..Default::default() }))
            .collect();

        for record in self.records_since(period.start_from(now), now)? {
            let date = self.local_date(record.slot_start);
            let day = days.entry(date).or_insert_with(|| CostDay {
                date,
                ..Default::default()
            });
            day.estimated_cost += record.estimated_cost;
            day.baseline_cost += record.baseline_cost;
            day.savings += record.savings();
        }

        Ok(days.into_values().collect())
    }

    /// Heating minutes and mean unit rate per local hour of day.
    pub fn patterns(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<HourPattern>> {
        let tz = self.schedule.timezone();
        let mut hours: Vec<HourPattern> = (0..24)
            .map(|hour| HourPattern {
                hour,
                ..Default::default()
            })
            .collect();

        for record in self.records_since(period.start_from(now), now)? {
            if let Some(bucket) = hours.get_mut(hour_index(tz, record.slot_start)) {
                bucket.heating_minutes += record.heated_minutes_within(record.slot_start, record.slot_end);
            }
        }

        let mut rate_sums = [(0.0_f64, 0_u32); 24];
        for slot in self.rates.history(period, now) {
            if let Some((sum, count)) = rate_sums.get_mut(hour_index(tz, slot.start)) {
                *sum += slot.unit_rate;
                *count += 1;
            }
        }
        for (bucket, (sum, count)) in hours.iter_mut().zip(rate_sums) {
            bucket.average_rate = (count > 0).then(|| sum / f64::from(count));
        }

        Ok(hours)
    }

    pub fn export_rows(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<ExportRow>> {
        let settings = self.schedule.get_settings();
        Ok(self
            .records_since(period.start_from(now), now)?
            .into_iter()
            .map(|record| ExportRow {
                slot_start: record.slot_start,
                slot_end: record.slot_end,
                heating: record.heating,
                rate: record.rate,
                rate_class: record.rate.map(|r| settings.classify(r)),
                mode: record.mode,
                reason: record.reason,
                estimated_cost: record.estimated_cost,
                baseline_cost: record.baseline_cost,
                savings: record.savings(),
            })
            .collect())
    }

    /// Export rows rendered as CSV. The header line is written even when the
    /// period has no records.
    pub fn export_csv(&self, period: Period, now: DateTime<Utc>) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(EXPORT_COLUMNS)
            .context("Failed to write export header")?;
        for row in self.export_rows(period, now)? {
            writer.serialize(row).context("Failed to write export row")?;
        }
        let bytes = writer.into_inner().context("Failed to flush export")?;
        String::from_utf8(bytes).context("Export is not valid UTF-8")
    }
}

fn heated_minutes(records: &[DecisionRecord]) -> i64 {
    records
        .iter()
        .map(|r| r.heated_minutes_within(r.slot_start, r.slot_end))
        .sum()
}

fn hour_index<Tz: TimeZone>(tz: Tz, t: DateTime<Utc>) -> usize {
    t.with_timezone(&tz).hour() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_log::MemoryDecisionLog;
    use chrono::{Duration, NaiveTime};
    use heatwise_types::{ConsumptionSample, HeatingWindow, RateSlot, Weekdays};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, h, m, 0).unwrap()
    }

    fn record(start: DateTime<Utc>, heating: bool, rate: f64) -> DecisionRecord {
        let energy = 1.5;
        DecisionRecord {
            slot_start: start,
            slot_end: start + slot_width(),
            heating,
            rate: Some(rate),
            mode: Mode::Optimized,
            reason: DecisionReason::RateOptimized,
            estimated_cost: if heating { rate * energy } else { 0.0 },
            baseline_cost: if heating { 24.5 * energy } else { 0.0 },
        }
    }

    struct Fixture {
        rates: Arc<RateStore>,
        log: Arc<MemoryDecisionLog>,
        consumption: Arc<ConsumptionStore>,
        stats: StatisticsAggregator,
    }

    fn fixture() -> Fixture {
        let schedule = Arc::new(ScheduleConfig::new(chrono_tz::Europe::London));
        schedule
            .replace_windows(vec![HeatingWindow {
                id: 1,
                start_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
                duration_minutes: 60,
                min_run_minutes: None,
                days_of_week: Weekdays::all(),
                enabled: true,
            }])
            .unwrap();
        let rates = Arc::new(RateStore::new());
        let log = Arc::new(MemoryDecisionLog::new());
        let consumption = Arc::new(ConsumptionStore::new());
        let stats = StatisticsAggregator::new(rates.clone(), log.clone(), schedule)
            .with_consumption(consumption.clone());
        Fixture {
            rates,
            log,
            consumption,
            stats,
        }
    }

    #[test]
    fn test_empty_period_returns_zeros() {
        let f = fixture();
        let summary = f.stats.summary(Period::Week, at(13, 12, 0)).unwrap();
        assert_eq!(summary.total_savings, 0.0);
        assert_eq!(summary.average_rate, 0.0);
        assert_eq!(summary.heating_duration_minutes, 0);
        assert_eq!(summary.efficiency, 0.0);
    }

    #[test]
    fn test_summary_figures() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();
        f.log.insert_if_absent(&record(at(12, 6, 30), true, 20.0)).unwrap();
        f.log.insert_if_absent(&record(at(12, 7, 0), false, 30.0)).unwrap();
        // outside the week
        f.log.insert_if_absent(&record(at(1, 6, 0), true, 10.0)).unwrap();
        f.rates
            .upsert(&[RateSlot::new(at(12, 6, 0), 10.0), RateSlot::new(at(12, 6, 30), 20.0)], "test")
            .unwrap();

        let summary = f.stats.summary(Period::Week, now).unwrap();
        // savings: (36.75 - 15) + (36.75 - 30)
        assert!((summary.total_savings - 28.5).abs() < 1e-9);
        assert!((summary.average_rate - 15.0).abs() < 1e-9);
        assert_eq!(summary.heating_duration_minutes, 60);
        // seven 06:00 instances started in the last week, 60 minutes each
        assert!((summary.efficiency - 60.0 / 420.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_is_capped() {
        let f = fixture();
        let now = at(13, 12, 0);
        for i in 0..40 {
            let start = at(12, 0, 0) + Duration::minutes(30 * i);
            f.log.insert_if_absent(&record(start, true, 5.0)).unwrap();
        }
        let summary = f.stats.summary(Period::Week, now).unwrap();
        assert_eq!(summary.efficiency, 100.0);
    }

    #[test]
    fn test_rate_history_is_classified() {
        let f = fixture();
        f.rates
            .upsert(
                &[
                    RateSlot::new(at(12, 1, 0), 8.0),
                    RateSlot::new(at(12, 1, 30), 20.0),
                    RateSlot::new(at(12, 2, 0), 31.0),
                ],
                "test",
            )
            .unwrap();
        let points = f.stats.rate_history(Period::Week, at(13, 0, 0));
        let classes: Vec<RateClass> = points.iter().map(|p| p.class).collect();
        assert_eq!(
            classes,
            vec![RateClass::Cheap, RateClass::Standard, RateClass::Expensive]
        );
    }

    #[test]
    fn test_daily_buckets_cover_every_day() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();
        f.log.insert_if_absent(&record(at(12, 6, 30), true, 10.0)).unwrap();

        let usage = f.stats.usage_history(Period::Week, now).unwrap();
        assert_eq!(usage.len(), 8);
        let day = usage
            .iter()
            .find(|d| d.date == NaiveDate::from_ymd_opt(2025, 1, 12).unwrap())
            .unwrap();
        assert_eq!(day.heating_minutes, 60);
        assert_eq!(day.heated_slots, 2);
        assert!((day.estimated_kwh - 3.0).abs() < 1e-9);
        assert_eq!(day.metered_kwh, None);

        let costs = f.stats.cost_history(Period::Week, now).unwrap();
        let total: f64 = costs.iter().map(|d| d.estimated_cost).sum();
        assert!((total - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_patterns_by_hour() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();
        f.log.insert_if_absent(&record(at(11, 6, 30), true, 10.0)).unwrap();
        f.rates
            .upsert(&[RateSlot::new(at(12, 6, 0), 10.0), RateSlot::new(at(12, 6, 30), 14.0)], "test")
            .unwrap();

        let patterns = f.stats.patterns(Period::Week, now).unwrap();
        assert_eq!(patterns.len(), 24);
        assert_eq!(patterns[6].heating_minutes, 60);
        assert_eq!(patterns[6].average_rate, Some(12.0));
        assert_eq!(patterns[7].average_rate, None);
    }

    #[test]
    fn test_statistics_view() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();
        f.log.insert_if_absent(&record(at(2, 6, 0), true, 20.0)).unwrap();

        let view = f.stats.statistics(now).unwrap();
        assert!((view.avg_duration - 30.0 / 7.0).abs() < 1e-9);
        assert!((view.current_week_costs - 15.0).abs() < 1e-9);
        assert!((view.current_month_costs - 45.0).abs() < 1e-9);
        assert!((view.savings - (21.75 + 6.75)).abs() < 1e-9);
    }

    #[test]
    fn test_month_costs_reach_into_previous_year() {
        let f = fixture();
        let now = at(10, 12, 0);
        let december = Utc.with_ymd_and_hms(2024, 12, 20, 6, 0, 0).unwrap();
        f.log.insert_if_absent(&record(december, true, 10.0)).unwrap();
        f.log.insert_if_absent(&record(at(8, 6, 0), true, 10.0)).unwrap();

        let view = f.stats.statistics(now).unwrap();
        assert!((view.current_month_costs - 30.0).abs() < 1e-9);
        assert!((view.current_week_costs - 15.0).abs() < 1e-9);
        // savings only count the current calendar year
        assert!((view.savings - 21.75).abs() < 1e-9);
    }

    #[test]
    fn test_usage_history_reports_metered_energy() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();
        let reading = |start: DateTime<Utc>, kwh| ConsumptionSample {
            start,
            end: start + slot_width(),
            kwh,
        };
        f.consumption.upsert(&[
            reading(at(12, 6, 0), 1.6),
            reading(at(12, 6, 30), 0.2),
            // before the period
            reading(at(1, 6, 0), 5.0),
        ]);

        let usage = f.stats.usage_history(Period::Week, now).unwrap();
        let day = usage
            .iter()
            .find(|d| d.date == NaiveDate::from_ymd_opt(2025, 1, 12).unwrap())
            .unwrap();
        assert!((day.estimated_kwh - 1.5).abs() < 1e-9);
        assert!((day.metered_kwh.unwrap() - 1.8).abs() < 1e-9);

        let quiet = usage
            .iter()
            .find(|d| d.date == NaiveDate::from_ymd_opt(2025, 1, 11).unwrap())
            .unwrap();
        assert_eq!(quiet.metered_kwh, None);
        assert_eq!(quiet.estimated_kwh, 0.0);
    }

    #[test]
    fn test_export_csv_has_header_and_rows() {
        let f = fixture();
        let now = at(13, 12, 0);
        f.log.insert_if_absent(&record(at(12, 6, 0), true, 10.0)).unwrap();

        let csv = f.stats.export_csv(Period::Week, now).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "slot_start,slot_end,heating,rate,rate_class,mode,reason,estimated_cost,baseline_cost,savings"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("cheap"));
        assert!(row.contains("rate_optimized"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_csv_without_records_is_header_only() {
        let f = fixture();
        let csv = f.stats.export_csv(Period::Month, at(13, 12, 0)).unwrap();
        assert_eq!(csv.trim_end(), EXPORT_COLUMNS.join(","));
    }
}
