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

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use heatwise_core::DecisionLog;
use heatwise_types::{ConsumptionSample, DecisionRecord, RateSlot};
use rusqlite::params;

/// SQLite storage for tariff slots, meter readings and the decision log.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database: {path}"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            rusqlite::Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_slots (
                slot_start     TEXT PRIMARY KEY,
                slot_end       TEXT NOT NULL,
                unit_rate      REAL NOT NULL,
                source         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS decision_records (
                slot_start     TEXT PRIMARY KEY,
                slot_end       TEXT NOT NULL,
                heating        INTEGER NOT NULL,
                rate           REAL,
                mode           TEXT NOT NULL,
                reason         TEXT NOT NULL,
                estimated_cost REAL NOT NULL,
                baseline_cost  REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS consumption_samples (
                interval_start TEXT PRIMARY KEY,
                interval_end   TEXT NOT NULL,
                kwh            REAL NOT NULL
            );",
        )
        .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert_rate_slots(&self, slots: &[RateSlot], source: &str) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rate_slots (slot_start, slot_end, unit_rate, source)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(slot_start) DO UPDATE SET
                    slot_end = ?2,
                    unit_rate = ?3,
                    source = ?4",
            )?;
            for slot in slots {
                stmt.execute(params![
                    slot.start.to_rfc3339(),
                    slot.end.to_rfc3339(),
                    slot.unit_rate,
                    source
                ])?;
            }
        }
        tx.commit()?;
        Ok(slots.len())
    }

    /// Stored slots starting at or after `since`, grouped by source in start order.
    pub fn load_rate_slots(&self, since: DateTime<Utc>) -> Result<Vec<(String, Vec<RateSlot>)>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT source, slot_start, slot_end, unit_rate FROM rate_slots
             WHERE slot_start >= ?1 ORDER BY source, slot_start",
        )?;

        let rows = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    RateSlot {
                        start: row.get(1)?,
                        end: row.get(2)?,
                        unit_rate: row.get(3)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut grouped: Vec<(String, Vec<RateSlot>)> = Vec::new();
        for (source, slot) in rows {
            match grouped.last_mut() {
                Some((last, slots)) if *last == source => slots.push(slot),
                _ => grouped.push((source, vec![slot])),
            }
        }
        Ok(grouped)
    }

    pub fn upsert_consumption(&self, samples: &[ConsumptionSample]) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO consumption_samples (interval_start, interval_end, kwh)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(interval_start) DO UPDATE SET
                    interval_end = ?2,
                    kwh = ?3",
            )?;
            for sample in samples {
                stmt.execute(params![
                    sample.start.to_rfc3339(),
                    sample.end.to_rfc3339(),
                    sample.kwh
                ])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }

    /// Meter readings starting at or after `since`, oldest first.
    pub fn load_consumption(&self, since: DateTime<Utc>) -> Result<Vec<ConsumptionSample>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT interval_start, interval_end, kwh FROM consumption_samples
             WHERE interval_start >= ?1 ORDER BY interval_start",
        )?;
        let samples = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok(ConsumptionSample {
                    start: row.get(0)?,
                    end: row.get(1)?,
                    kwh: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Delete rate slots, meter readings and decision records older than the
    /// retention window.
    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<u64> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let cutoff_str = cutoff.to_rfc3339();
        let rates = conn.execute(
            "DELETE FROM rate_slots WHERE slot_start < ?1",
            params![cutoff_str],
        )?;
        let decisions = conn.execute(
            "DELETE FROM decision_records WHERE slot_start < ?1",
            params![cutoff_str],
        )?;
        let readings = conn.execute(
            "DELETE FROM consumption_samples WHERE interval_start < ?1",
            params![cutoff_str],
        )?;
        Ok((rates + decisions + readings) as u64)
    }

    pub fn decision_count(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM decision_records", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_text<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DecisionRecord> {
    Ok(DecisionRecord {
        slot_start: row.get(0)?,
        slot_end: row.get(1)?,
        heating: row.get(2)?,
        rate: row.get(3)?,
        mode: parse_text(4, &row.get::<_, String>(4)?)?,
        reason: parse_text(5, &row.get::<_, String>(5)?)?,
        estimated_cost: row.get(6)?,
        baseline_cost: row.get(7)?,
    })
}

const RECORD_COLUMNS: &str =
    "slot_start, slot_end, heating, rate, mode, reason, estimated_cost, baseline_cost";

impl DecisionLog for Database {
    fn insert_if_absent(&self, record: &DecisionRecord) -> Result<bool> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO decision_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                record.slot_start.to_rfc3339(),
                record.slot_end.to_rfc3339(),
                record.heating,
                record.rate,
                record.mode.as_str(),
                record.reason.as_str(),
                record.estimated_cost,
                record.baseline_cost
            ],
        )?;
        Ok(inserted == 1)
    }

    fn get(&self, slot_start: DateTime<Utc>) -> Result<Option<DecisionRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM decision_records WHERE slot_start = ?1"
        ))?;
        let mut rows = stmt.query_map(params![slot_start.to_rfc3339()], record_from_row)?;
        let record = rows.next().transpose()?;
        Ok(record)
    }

    fn records_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DecisionRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM decision_records
             WHERE slot_start >= ?1 AND slot_start < ?2 ORDER BY slot_start"
        ))?;
        let records = stmt
            .query_map(params![from.to_rfc3339(), to.to_rfc3339()], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
