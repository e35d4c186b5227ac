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

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use heatwise_types::DecisionRecord;
use parking_lot::RwLock;

/// Append-only log of slot decisions, keyed by slot start.
pub trait DecisionLog: Send + Sync + std::fmt::Debug {
    /// Store the record unless one already exists for its slot. Returns
    /// `true` when the record was written.
    fn insert_if_absent(&self, record: &DecisionRecord) -> Result<bool>;

    fn get(&self, slot_start: DateTime<Utc>) -> Result<Option<DecisionRecord>>;

    /// Records whose slot starts in `[from, to)`, ordered by slot start.
    fn records_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DecisionRecord>>;
}

/// Decision log kept in memory. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryDecisionLog {
    records: RwLock<BTreeMap<DateTime<Utc>, DecisionRecord>>,
}

impl MemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl DecisionLog for MemoryDecisionLog {
    fn insert_if_absent(&self, record: &DecisionRecord) -> Result<bool> {
        let mut records = self.records.write();
        if records.contains_key(&record.slot_start) {
            return Ok(false);
        }
        records.insert(record.slot_start, record.clone());
        Ok(true)
    }

    fn get(&self, slot_start: DateTime<Utc>) -> Result<Option<DecisionRecord>> {
        Ok(self.records.read().get(&slot_start).cloned())
    }

    fn records_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DecisionRecord>> {
        if to <= from {
            return Ok(Vec::new());
        }
        Ok(self.records.read().range(from..to).map(|(_, r)| r.clone()).collect())
    }
}
