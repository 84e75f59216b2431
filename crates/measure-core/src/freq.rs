// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU frequency residency tracking.
//!
//! The cpufreq `time_in_state` table reports, per available frequency, the
//! cumulative number of scheduler ticks the CPU has spent at that frequency
//! since boot. A [`FreqResidency`] mirrors that table inside a snapshot:
//! append-only, keyed by frequency, unordered with respect to frequency
//! value.
//!
//! Because the counters are cumulative, the average frequency over an
//! interval is *tick-weighted*: each frequency contributes in proportion to
//! the ticks spent at it between the two snapshots, not one vote per
//! frequency bucket.

use serde::Serialize;

/// Entries are appended in chunks to keep reallocation off the per-insert
/// path. Must be a power of two.
const ENTRY_CHUNK: usize = 32;

/// Cumulative ticks observed at one CPU frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreqTicks {
    /// The CPU frequency in kHz.
    pub freq_khz: i64,
    /// Cumulative ticks spent at this frequency since boot.
    pub ticks: i64,
}

/// Per-frequency cumulative tick table for one snapshot.
///
/// Frequencies are unique keys; recording a frequency that is already
/// present overwrites its tick count in place. Entries are never removed
/// during a snapshot's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreqResidency {
    entries: Vec<FreqTicks>,
}

impl FreqResidency {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the cumulative `ticks` observed at `freq_khz`, overwriting
    /// the existing entry for that frequency or appending a new one.
    pub fn record(&mut self, freq_khz: i64, ticks: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.freq_khz == freq_khz) {
            entry.ticks = ticks;
            return;
        }
        if self.entries.len() % ENTRY_CHUNK == 0 {
            self.entries.reserve_exact(ENTRY_CHUNK);
        }
        self.entries.push(FreqTicks { freq_khz, ticks });
    }

    /// Returns the cumulative ticks recorded for `freq_khz`, if any.
    pub fn ticks_at(&self, freq_khz: i64) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.freq_khz == freq_khz)
            .map(|e| e.ticks)
    }

    /// The recorded entries, in insertion order.
    pub fn entries(&self) -> &[FreqTicks] {
        &self.entries
    }

    /// Number of distinct frequencies recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no frequency has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick-weighted average frequency between `earlier` and this (later)
    /// table, in kHz.
    ///
    /// For every frequency in this table, the tick delta against the
    /// matching frequency in `earlier` (zero ticks when absent) weights
    /// that frequency's contribution. Returns 0 when the total tick delta
    /// is 0 — including the empty-table case.
    pub fn weighted_avg_khz(&self, earlier: &FreqResidency) -> i64 {
        let mut total_ticks: i64 = 0;
        let mut total_freq_ticks: i64 = 0;
        for entry in &self.entries {
            let before = earlier.ticks_at(entry.freq_khz).unwrap_or(0);
            let delta = entry.ticks - before;
            total_ticks += delta;
            total_freq_ticks += entry.freq_khz * delta;
        }
        if total_ticks == 0 {
            0
        } else {
            total_freq_ticks / total_ticks
        }
    }
}
