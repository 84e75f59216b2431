// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-system resource snapshots.
//!
//! A [`SystemSnapshot`] is one point-in-time reading of machine-wide
//! resource state: memory usage from the meminfo table, aggregate CPU tick
//! counters from `proc/stat`, per-frequency residency from cpufreq, and
//! optionally control-group memory accounting and the Maemo-style kernel
//! watermark flags.
//!
//! Values that never change between samples of the same machine — total
//! memory, total swap, maximum CPU frequency, the selected control-group
//! root — live in a [`CommonSystemData`] shared by every snapshot derived
//! from the same initialization via [`SystemSnapshot::sibling`]. Only
//! snapshots sharing common data can be diffed; the delta operations check
//! this before reading any field.
//!
//! # Example
//! ```no_run
//! use measure_core::{SysResources, SystemSnapshot};
//! use proc_source::FsRoot;
//!
//! let root = FsRoot::default();
//! let (mut first, _failed) = SystemSnapshot::initial(SysResources::COMMON, &root);
//! let mut second = first.sibling();
//!
//! first.refresh(SysResources::SNAPSHOT, Some("before"));
//! // ... workload ...
//! second.refresh(SysResources::SNAPSHOT, Some("after"));
//!
//! let usage_bp = second.cpu_usage_basis_points(&first)?;
//! println!("cpu: {}.{:02}%", usage_bp / 100, usage_bp % 100);
//! # Ok::<(), measure_core::MeasureError>(())
//! ```

use crate::cgroup;
use crate::{next_common_id, FreqResidency, MeasureError, SysResources};
use proc_source::kvfile::{self, KeyQuery};
use proc_source::{value, FsRoot, SourceError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

const MEMINFO: &str = "proc/meminfo";
const PROC_STAT: &str = "proc/stat";
const CPUINFO_MAX_FREQ: &str = "sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";
const TIME_IN_STATE: &str = "sys/devices/system/cpu/cpu0/cpufreq/stats/time_in_state";
const LOW_WATERMARK: &str = "sys/kernel/low_watermark";
const HIGH_WATERMARK: &str = "sys/kernel/high_watermark";
const CGROUP_MEM_USAGE: &str = "memory.memsw.usage_in_bytes";

/// The kernel has signalled the low memory watermark.
pub const MEM_WATERMARK_LOW: i32 = 1;
/// The kernel has signalled the high memory watermark.
pub const MEM_WATERMARK_HIGH: i32 = 1 << 1;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// System state that does not change between snapshots of one machine.
///
/// Shared by reference between sibling snapshots; dropped together with
/// the last of them. Immutable after construction except for the
/// control-group root, which [`SystemSnapshot::select_cgroup`] sets.
#[derive(Debug)]
pub struct CommonSystemData {
    /// Opaque identity token. Deltas compare this to decide whether two
    /// snapshots belong to the same initialization.
    id: u64,
    /// The filesystem root captured at initialization. Later roots do not
    /// reach back into existing snapshots.
    root: FsRoot,
    mem_total_kb: Option<i64>,
    swap_total_kb: Option<i64>,
    cpu_max_freq_khz: Option<i64>,
    cgroup_root: RwLock<Option<PathBuf>>,
}

impl CommonSystemData {
    /// Total physical memory in KB, when the init-time read succeeded.
    pub fn mem_total_kb(&self) -> Option<i64> {
        self.mem_total_kb
    }

    /// Total swap in KB, when the init-time read succeeded.
    pub fn swap_total_kb(&self) -> Option<i64> {
        self.swap_total_kb
    }

    /// Maximum CPU frequency in kHz, when the init-time read succeeded.
    pub fn cpu_max_freq_khz(&self) -> Option<i64> {
        self.cpu_max_freq_khz
    }

    /// The currently selected control-group root, if any.
    pub fn cgroup_root(&self) -> Option<PathBuf> {
        self.cgroup_root.read().ok().and_then(|g| g.clone())
    }
}

/// One point-in-time reading of system resource usage.
#[derive(Debug, serde::Serialize)]
pub struct SystemSnapshot {
    #[serde(skip)]
    common: Arc<CommonSystemData>,
    label: Option<String>,
    timestamp_ms: Option<i64>,
    mem_free_kb: Option<i64>,
    mem_buffers_kb: Option<i64>,
    mem_cached_kb: Option<i64>,
    swap_free_kb: Option<i64>,
    swap_cached_kb: Option<i64>,
    cgroup_mem_kb: Option<i64>,
    mem_watermark: Option<i32>,
    cpu_ticks_total: Option<i64>,
    cpu_ticks_idle: Option<i64>,
    freq_residency: FreqResidency,
}

impl SystemSnapshot {
    /// Creates the first snapshot of a machine, allocating fresh common
    /// data and populating the requested init-time groups
    /// ([`SysResources::MEM_TOTALS`], [`SysResources::CPU_MAX_FREQ`],
    /// [`SysResources::CGROUP`]).
    ///
    /// Returns the snapshot together with the set of groups whose reads
    /// failed; their fields stay unread (`None`). An empty set is full
    /// success. Further snapshots of the same machine come from
    /// [`sibling`](Self::sibling), never from a second `initial` call —
    /// separately initialized snapshots are not comparable.
    pub fn initial(resources: SysResources, root: &FsRoot) -> (Self, SysResources) {
        let mut failed = SysResources::NONE;
        let mut mem_total_kb = None;
        let mut swap_total_kb = None;
        let mut cpu_max_freq_khz = None;

        if resources.contains(SysResources::MEM_TOTALS) {
            let path = root.join(MEMINFO);
            let mut queries = [KeyQuery::new("MemTotal"), KeyQuery::new("SwapTotal")];
            match kvfile::read_first_match(&path, &mut queries) {
                Ok(n) if n == queries.len() => {
                    mem_total_kb = queries[0].value;
                    swap_total_kb = queries[1].value;
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "memory totals unavailable");
                    failed |= SysResources::MEM_TOTALS;
                }
            }
        }

        if resources.contains(SysResources::CPU_MAX_FREQ) {
            let path = root.join(CPUINFO_MAX_FREQ);
            match value::read_int(&path) {
                Ok(khz) => cpu_max_freq_khz = Some(khz),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "max cpu frequency unavailable");
                    failed |= SysResources::CPU_MAX_FREQ;
                }
            }
        }

        let snapshot = Self {
            common: Arc::new(CommonSystemData {
                id: next_common_id(),
                root: root.clone(),
                mem_total_kb,
                swap_total_kb,
                cpu_max_freq_khz,
                cgroup_root: RwLock::new(None),
            }),
            label: None,
            timestamp_ms: None,
            mem_free_kb: None,
            mem_buffers_kb: None,
            mem_cached_kb: None,
            swap_free_kb: None,
            swap_cached_kb: None,
            cgroup_mem_kb: None,
            mem_watermark: None,
            cpu_ticks_total: None,
            cpu_ticks_idle: None,
            freq_residency: FreqResidency::new(),
        };

        if resources.contains(SysResources::CGROUP) {
            snapshot.select_cgroup("");
        }

        (snapshot, failed)
    }

    /// Creates a new snapshot sharing this snapshot's common data. The
    /// mutable readings start unread.
    pub fn sibling(&self) -> Self {
        Self {
            common: Arc::clone(&self.common),
            label: None,
            timestamp_ms: None,
            mem_free_kb: None,
            mem_buffers_kb: None,
            mem_cached_kb: None,
            swap_free_kb: None,
            swap_cached_kb: None,
            cgroup_mem_kb: None,
            mem_watermark: None,
            cpu_ticks_total: None,
            cpu_ticks_idle: None,
            freq_residency: FreqResidency::new(),
        }
    }

    /// Repopulates the requested refresh-time resource groups from the
    /// kernel interfaces, returning the set of groups that failed.
    ///
    /// Each group is read independently: one group's failure does not stop
    /// the others, and a failed group's fields are reset to unread rather
    /// than left stale. The frequency-residency table is the one
    /// exception — it keeps its previous entries on a failed read, since
    /// entries are never removed within a snapshot's lifetime.
    ///
    /// A non-`None` `label` replaces the previous label; `None` keeps it.
    pub fn refresh(&mut self, resources: SysResources, label: Option<&str>) -> SysResources {
        let mut failed = SysResources::NONE;

        if let Some(label) = label {
            self.label = Some(label.to_string());
        }

        if resources.contains(SysResources::TIMESTAMP) {
            self.timestamp_ms = Some(now_ms_since_midnight());
        }

        if resources.contains(SysResources::MEM_USAGE) {
            let path = self.common.root.join(MEMINFO);
            let mut queries = [
                KeyQuery::new("MemFree"),
                KeyQuery::new("Buffers"),
                KeyQuery::new("Cached"),
                KeyQuery::new("SwapCached"),
                KeyQuery::new("SwapFree"),
            ];
            match kvfile::read_first_match(&path, &mut queries) {
                Ok(n) if n == queries.len() => {
                    self.mem_free_kb = queries[0].value;
                    self.mem_buffers_kb = queries[1].value;
                    self.mem_cached_kb = queries[2].value;
                    self.swap_cached_kb = queries[3].value;
                    self.swap_free_kb = queries[4].value;
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "memory usage read failed");
                    self.mem_free_kb = None;
                    self.mem_buffers_kb = None;
                    self.mem_cached_kb = None;
                    self.swap_cached_kb = None;
                    self.swap_free_kb = None;
                    failed |= SysResources::MEM_USAGE;
                }
            }
        }

        if resources.contains(SysResources::CGROUP_MEM) {
            self.cgroup_mem_kb = match self.common.cgroup_root() {
                Some(group) => match value::read_int(&group.join(CGROUP_MEM_USAGE)) {
                    Ok(bytes) => Some(bytes >> 10),
                    Err(e) => {
                        tracing::warn!(group = %group.display(), error = %e, "cgroup memory read failed");
                        failed |= SysResources::CGROUP_MEM;
                        None
                    }
                },
                None => {
                    failed |= SysResources::CGROUP_MEM;
                    None
                }
            };
        }

        if resources.contains(SysResources::WATERMARK) {
            let low = value::read_int(&self.common.root.join(LOW_WATERMARK));
            let high = value::read_int(&self.common.root.join(HIGH_WATERMARK));
            self.mem_watermark = match (low, high) {
                (Ok(low), Ok(high)) => Some((low | (high << 1)) as i32),
                _ => {
                    failed |= SysResources::WATERMARK;
                    None
                }
            };
        }

        if resources.contains(SysResources::CPU_USAGE) {
            let path = self.common.root.join(PROC_STAT);
            match read_cpu_ticks(&path) {
                Ok((total, idle)) => {
                    self.cpu_ticks_total = Some(total);
                    self.cpu_ticks_idle = Some(idle);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cpu tick read failed");
                    self.cpu_ticks_total = None;
                    self.cpu_ticks_idle = None;
                    failed |= SysResources::CPU_USAGE;
                }
            }
        }

        if resources.contains(SysResources::CPU_FREQ) {
            let path = self.common.root.join(TIME_IN_STATE);
            if let Err(e) = read_freq_residency(&path, &mut self.freq_residency) {
                tracing::warn!(path = %path.display(), error = %e, "frequency residency read failed");
                failed |= SysResources::CPU_FREQ;
            }
        }

        if !failed.is_empty() {
            tracing::debug!(failed = %failed, "system refresh partially failed");
        }
        failed
    }

    /// Selects the control-group whose directory path contains `pattern`,
    /// storing it in the shared common data for subsequent
    /// [`SysResources::CGROUP_MEM`] refreshes. An empty pattern, or no
    /// match, selects the fixed control-group mount root. Returns the
    /// selected path.
    pub fn select_cgroup(&self, pattern: &str) -> PathBuf {
        let base = self.common.root.join(cgroup::CGROUP_FIXED_ROOT);
        let selected = if pattern.is_empty() {
            base
        } else {
            cgroup::find_group(&base, pattern).unwrap_or(base)
        };
        if let Ok(mut group) = self.common.cgroup_root.write() {
            *group = Some(selected.clone());
        }
        selected
    }

    /// The shared common data.
    pub fn common(&self) -> &CommonSystemData {
        &self.common
    }

    /// Returns `true` if `other` was derived from the same initialization
    /// and may therefore be diffed against this snapshot.
    pub fn shares_common(&self, other: &Self) -> bool {
        self.common.id == other.common.id
    }

    /// Number of snapshots currently referencing this snapshot's common
    /// data (including this one).
    pub fn common_refs(&self) -> usize {
        Arc::strong_count(&self.common)
    }

    /// The snapshot label, if one was assigned.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Milliseconds since midnight at the time of the last refresh.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    /// Unused memory in KB.
    pub fn mem_free_kb(&self) -> Option<i64> {
        self.mem_free_kb
    }

    /// Memory used for file buffers in KB.
    pub fn mem_buffers_kb(&self) -> Option<i64> {
        self.mem_buffers_kb
    }

    /// Memory used for caching in KB.
    pub fn mem_cached_kb(&self) -> Option<i64> {
        self.mem_cached_kb
    }

    /// Unused swap in KB.
    pub fn swap_free_kb(&self) -> Option<i64> {
        self.swap_free_kb
    }

    /// Swap used for caching in KB.
    pub fn swap_cached_kb(&self) -> Option<i64> {
        self.swap_cached_kb
    }

    /// Control-group memory usage in KB.
    pub fn cgroup_mem_kb(&self) -> Option<i64> {
        self.cgroup_mem_kb
    }

    /// Kernel watermark flags ([`MEM_WATERMARK_LOW`] |
    /// [`MEM_WATERMARK_HIGH`]).
    pub fn mem_watermark(&self) -> Option<i32> {
        self.mem_watermark
    }

    /// Total CPU ticks across all states since boot.
    pub fn cpu_ticks_total(&self) -> Option<i64> {
        self.cpu_ticks_total
    }

    /// Idle CPU ticks since boot.
    pub fn cpu_ticks_idle(&self) -> Option<i64> {
        self.cpu_ticks_idle
    }

    /// The per-frequency residency table.
    pub fn freq_residency(&self) -> &FreqResidency {
        &self.freq_residency
    }

    /// Used memory in KB:
    /// `total + swap_total − free − cached − buffers − swap_free − swap_cached`.
    /// `None` until every component has been read.
    pub fn mem_used_kb(&self) -> Option<i64> {
        Some(
            self.common.mem_total_kb? + self.common.swap_total_kb?
                - self.mem_free_kb?
                - self.mem_cached_kb?
                - self.mem_buffers_kb?
                - self.swap_free_kb?
                - self.swap_cached_kb?,
        )
    }

    // ── Deltas ─────────────────────────────────────────────────────────
    //
    // Every delta takes the earlier snapshot as argument and is computed
    // on the later one: `later.elapsed_ms(&earlier)`.

    /// Milliseconds elapsed between `earlier` and this snapshot, in
    /// `[0, 86_400_000)`. A timestamp pair straddling midnight still
    /// yields the small positive interval.
    pub fn elapsed_ms(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = defined(self.timestamp_ms, "timestamp")?;
        let first = defined(earlier.timestamp_ms, "timestamp")?;
        let mut diff = later - first;
        if diff < 0 {
            diff += MS_PER_DAY;
        }
        Ok(diff)
    }

    /// Total CPU ticks elapsed between the snapshots.
    pub fn cpu_ticks_delta(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = defined(self.cpu_ticks_total, "cpu-ticks-total")?;
        let first = defined(earlier.cpu_ticks_total, "cpu-ticks-total")?;
        Ok(later - first)
    }

    /// CPU usage over the interval as percent × 100 (basis points):
    /// `(Δtotal − Δidle) * 10_000 / Δtotal`, or 0 when no ticks elapsed.
    pub fn cpu_usage_basis_points(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let total_delta = defined(self.cpu_ticks_total, "cpu-ticks-total")?
            - defined(earlier.cpu_ticks_total, "cpu-ticks-total")?;
        let idle_delta = defined(self.cpu_ticks_idle, "cpu-ticks-idle")?
            - defined(earlier.cpu_ticks_idle, "cpu-ticks-idle")?;
        if total_delta == 0 {
            return Ok(0);
        }
        Ok((total_delta - idle_delta) * 10_000 / total_delta)
    }

    /// Tick-weighted average CPU frequency over the interval, in kHz.
    /// 0 when this snapshot's residency table is empty or no ticks
    /// elapsed.
    pub fn cpu_avg_freq_khz(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        Ok(self.freq_residency.weighted_avg_khz(&earlier.freq_residency))
    }

    /// Change in used memory (see [`mem_used_kb`](Self::mem_used_kb))
    /// between the snapshots, in KB.
    pub fn mem_used_delta_kb(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = defined(self.mem_used_kb(), "mem-used")?;
        let first = defined(earlier.mem_used_kb(), "mem-used")?;
        Ok(later - first)
    }

    /// Change in control-group memory usage between the snapshots, in KB.
    pub fn cgroup_mem_delta_kb(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = defined(self.cgroup_mem_kb, "cgroup-mem")?;
        let first = defined(earlier.cgroup_mem_kb, "cgroup-mem")?;
        Ok(later - first)
    }

    fn require_comparable(&self, other: &Self) -> Result<(), MeasureError> {
        if self.common.id != other.common.id {
            return Err(MeasureError::SnapshotMismatch);
        }
        Ok(())
    }
}

fn defined(value: Option<i64>, field: &'static str) -> Result<i64, MeasureError> {
    value.ok_or(MeasureError::UndefinedField { field })
}

fn now_ms_since_midnight() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    ((since_epoch.as_secs() % 86_400) * 1000 + u64::from(since_epoch.subsec_millis())) as i64
}

/// Parses the aggregate `cpu ` line of `proc/stat` into
/// `(total ticks, idle ticks)` — the sum of every column, and the fourth
/// column.
fn read_cpu_ticks(path: &Path) -> Result<(i64, i64), SourceError> {
    let content = std::fs::read_to_string(path).map_err(|e| SourceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu ") else {
            continue;
        };
        let mut total = 0i64;
        let mut idle = None;
        for (index, token) in rest.split_whitespace().enumerate() {
            let ticks: i64 = token.parse().map_err(|_| SourceError::Parse {
                path: path.display().to_string(),
                detail: format!("expected tick count, got '{token}'"),
            })?;
            total += ticks;
            if index == 3 {
                idle = Some(ticks);
            }
        }
        let idle = idle.ok_or_else(|| SourceError::Parse {
            path: path.display().to_string(),
            detail: "aggregate cpu line has fewer than 4 fields".to_string(),
        })?;
        return Ok((total, idle));
    }

    Err(SourceError::Parse {
        path: path.display().to_string(),
        detail: "aggregate cpu line not found".to_string(),
    })
}

/// Parses `time_in_state` (`<freq_khz> <ticks>` per line) into the
/// residency table. Lines in any other shape are skipped.
fn read_freq_residency(path: &Path, table: &mut FreqResidency) -> Result<(), SourceError> {
    let content = std::fs::read_to_string(path).map_err(|e| SourceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(freq), Some(ticks)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let (Ok(freq), Ok(ticks)) = (freq.parse::<i64>(), ticks.parse::<i64>()) {
            table.record(freq, ticks);
        }
    }
    Ok(())
}
