// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-process resource snapshots.
//!
//! A [`ProcessSnapshot`] reads one process's memory totals from its smaps
//! table and its user/system CPU tick counters from its stat file. The
//! process identity — pid, display name, and the two resolved file paths —
//! lives in a [`CommonProcessData`] shared between sibling snapshots, the
//! same ownership model as the system side.
//!
//! The smaps/stat paths are resolved against the filesystem root exactly
//! once, when the first snapshot is created. Every refresh starts with a
//! liveness check on the resolved stat path; a vanished process is an
//! unrecoverable error that leaves the snapshot untouched.

use crate::{next_common_id, MeasureError, ProcResources};
use proc_source::kvfile::{self, KeyQuery};
use proc_source::{process, FsRoot, SourceError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Process identity shared by all snapshots of one monitored process.
///
/// The pid and file paths never change after construction; the display
/// name can be re-resolved via
/// [`ProcessSnapshot::refresh_identity`] (processes rewrite their argv).
#[derive(Debug)]
pub struct CommonProcessData {
    id: u64,
    pid: i32,
    name: RwLock<Option<String>>,
    root: FsRoot,
    smaps_path: PathBuf,
    stat_path: PathBuf,
}

impl CommonProcessData {
    /// The monitored process id.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// The process display name, if one could be resolved.
    pub fn name(&self) -> Option<String> {
        self.name.read().ok().and_then(|n| n.clone())
    }

    /// The resolved path of the process's smaps table.
    pub fn smaps_path(&self) -> &Path {
        &self.smaps_path
    }

    /// The resolved path of the process's stat file.
    pub fn stat_path(&self) -> &Path {
        &self.stat_path
    }
}

/// One point-in-time reading of a process's resource usage.
#[derive(Debug, serde::Serialize)]
pub struct ProcessSnapshot {
    #[serde(skip)]
    common: Arc<CommonProcessData>,
    label: Option<String>,
    mem_private_clean_kb: Option<i64>,
    mem_private_dirty_kb: Option<i64>,
    mem_swap_kb: Option<i64>,
    mem_size_kb: Option<i64>,
    mem_shared_clean_kb: Option<i64>,
    mem_shared_dirty_kb: Option<i64>,
    mem_pss_kb: Option<i64>,
    mem_rss_kb: Option<i64>,
    mem_referenced_kb: Option<i64>,
    cpu_stime_ticks: Option<i64>,
    cpu_utime_ticks: Option<i64>,
}

impl ProcessSnapshot {
    /// Creates the first snapshot of process `pid`, resolving its smaps
    /// and stat paths against `root` and its display name from
    /// cmdline/status.
    ///
    /// Returns [`MeasureError::ProcessVanished`] when the process does not
    /// exist; nothing is allocated in that case. Further snapshots of the
    /// same process come from [`sibling`](Self::sibling).
    pub fn initial(pid: i32, root: &FsRoot) -> Result<Self, MeasureError> {
        if !process::alive(root, pid) {
            return Err(MeasureError::ProcessVanished { pid });
        }
        let common = CommonProcessData {
            id: next_common_id(),
            pid,
            name: RwLock::new(process::display_name(root, pid)),
            root: root.clone(),
            smaps_path: root.join(format!("proc/{pid}/smaps")),
            stat_path: root.join(format!("proc/{pid}/stat")),
        };
        Ok(Self::unread(Arc::new(common)))
    }

    /// Creates a new snapshot sharing this snapshot's common data. The
    /// mutable readings start unread.
    pub fn sibling(&self) -> Self {
        Self::unread(Arc::clone(&self.common))
    }

    fn unread(common: Arc<CommonProcessData>) -> Self {
        Self {
            common,
            label: None,
            mem_private_clean_kb: None,
            mem_private_dirty_kb: None,
            mem_swap_kb: None,
            mem_size_kb: None,
            mem_shared_clean_kb: None,
            mem_shared_dirty_kb: None,
            mem_pss_kb: None,
            mem_rss_kb: None,
            mem_referenced_kb: None,
            cpu_stime_ticks: None,
            cpu_utime_ticks: None,
        }
    }

    /// Repopulates the requested resource groups, returning the set of
    /// groups that failed.
    ///
    /// Verifies first that the process still exists; a vanished process is
    /// [`MeasureError::ProcessVanished`] and nothing — not even the
    /// label — is touched. After that, groups are read independently and
    /// a failed group's fields are reset to unread rather than left
    /// stale. A non-`None` `label` replaces the previous label.
    pub fn refresh(
        &mut self,
        resources: ProcResources,
        label: Option<&str>,
    ) -> Result<ProcResources, MeasureError> {
        if !self.common.stat_path.exists() {
            return Err(MeasureError::ProcessVanished {
                pid: self.common.pid,
            });
        }

        let mut failed = ProcResources::NONE;

        if let Some(label) = label {
            self.label = Some(label.to_string());
        }

        if resources.contains(ProcResources::MEM_USAGE) {
            let mut queries = [
                KeyQuery::new("Private_Clean"),
                KeyQuery::new("Private_Dirty"),
                KeyQuery::new("Swap"),
                KeyQuery::new("Size"),
                KeyQuery::new("Shared_Clean"),
                KeyQuery::new("Shared_Dirty"),
                KeyQuery::new("Pss"),
                KeyQuery::new("Rss"),
                KeyQuery::new("Referenced"),
            ];
            match kvfile::read_accumulated(&self.common.smaps_path, &mut queries) {
                Ok(_) => {
                    self.mem_private_clean_kb = queries[0].value;
                    self.mem_private_dirty_kb = queries[1].value;
                    self.mem_swap_kb = queries[2].value;
                    self.mem_size_kb = queries[3].value;
                    self.mem_shared_clean_kb = queries[4].value;
                    self.mem_shared_dirty_kb = queries[5].value;
                    self.mem_pss_kb = queries[6].value;
                    self.mem_rss_kb = queries[7].value;
                    self.mem_referenced_kb = queries[8].value;
                }
                Err(e) => {
                    tracing::warn!(
                        pid = self.common.pid,
                        error = %e,
                        "process memory read failed"
                    );
                    self.mem_private_clean_kb = None;
                    self.mem_private_dirty_kb = None;
                    self.mem_swap_kb = None;
                    self.mem_size_kb = None;
                    self.mem_shared_clean_kb = None;
                    self.mem_shared_dirty_kb = None;
                    self.mem_pss_kb = None;
                    self.mem_rss_kb = None;
                    self.mem_referenced_kb = None;
                    failed |= ProcResources::MEM_USAGE;
                }
            }
        }

        if resources.contains(ProcResources::CPU_USAGE) {
            match read_proc_cpu_ticks(&self.common.stat_path) {
                Ok((utime, stime)) => {
                    self.cpu_utime_ticks = Some(utime);
                    self.cpu_stime_ticks = Some(stime);
                }
                Err(e) => {
                    tracing::warn!(
                        pid = self.common.pid,
                        error = %e,
                        "process cpu read failed"
                    );
                    self.cpu_utime_ticks = None;
                    self.cpu_stime_ticks = None;
                    failed |= ProcResources::CPU_USAGE;
                }
            }
        }

        Ok(failed)
    }

    /// Re-resolves only the display name in the shared common data;
    /// counters are untouched. Processes rewrite their argv, so the name
    /// seen at initialization can go stale.
    pub fn refresh_identity(&self) {
        let name = process::display_name(&self.common.root, self.common.pid);
        if let Ok(mut slot) = self.common.name.write() {
            *slot = name;
        }
    }

    /// The shared common data.
    pub fn common(&self) -> &CommonProcessData {
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

    /// Private clean memory in KB.
    pub fn mem_private_clean_kb(&self) -> Option<i64> {
        self.mem_private_clean_kb
    }

    /// Private dirty memory in KB.
    pub fn mem_private_dirty_kb(&self) -> Option<i64> {
        self.mem_private_dirty_kb
    }

    /// Swapped-out memory in KB.
    pub fn mem_swap_kb(&self) -> Option<i64> {
        self.mem_swap_kb
    }

    /// Total mapped size in KB.
    pub fn mem_size_kb(&self) -> Option<i64> {
        self.mem_size_kb
    }

    /// Shared clean memory in KB.
    pub fn mem_shared_clean_kb(&self) -> Option<i64> {
        self.mem_shared_clean_kb
    }

    /// Shared dirty memory in KB.
    pub fn mem_shared_dirty_kb(&self) -> Option<i64> {
        self.mem_shared_dirty_kb
    }

    /// Proportional set size in KB.
    pub fn mem_pss_kb(&self) -> Option<i64> {
        self.mem_pss_kb
    }

    /// Resident set size in KB.
    pub fn mem_rss_kb(&self) -> Option<i64> {
        self.mem_rss_kb
    }

    /// Referenced memory in KB.
    pub fn mem_referenced_kb(&self) -> Option<i64> {
        self.mem_referenced_kb
    }

    /// System-mode CPU ticks spent by the process.
    pub fn cpu_stime_ticks(&self) -> Option<i64> {
        self.cpu_stime_ticks
    }

    /// User-mode CPU ticks spent by the process.
    pub fn cpu_utime_ticks(&self) -> Option<i64> {
        self.cpu_utime_ticks
    }

    /// Private dirty plus swapped memory in KB — the process's
    /// "own cost" figure the monitor reports. `None` until the memory
    /// group has been read.
    pub fn mem_private_dirty_sum_kb(&self) -> Option<i64> {
        Some(self.mem_private_dirty_kb? + self.mem_swap_kb?)
    }

    // ── Deltas ─────────────────────────────────────────────────────────

    /// Change in private dirty + swapped memory between the snapshots, in
    /// KB.
    pub fn mem_private_dirty_delta_kb(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = self
            .mem_private_dirty_sum_kb()
            .ok_or(MeasureError::UndefinedField {
                field: "mem-private-dirty",
            })?;
        let first = earlier
            .mem_private_dirty_sum_kb()
            .ok_or(MeasureError::UndefinedField {
                field: "mem-private-dirty",
            })?;
        Ok(later - first)
    }

    /// CPU ticks (user + system) spent by the process between the
    /// snapshots.
    pub fn cpu_ticks_delta(&self, earlier: &Self) -> Result<i64, MeasureError> {
        self.require_comparable(earlier)?;
        let later = self
            .cpu_ticks_sum()
            .ok_or(MeasureError::UndefinedField { field: "cpu-ticks" })?;
        let first = earlier
            .cpu_ticks_sum()
            .ok_or(MeasureError::UndefinedField { field: "cpu-ticks" })?;
        Ok(later - first)
    }

    fn cpu_ticks_sum(&self) -> Option<i64> {
        Some(self.cpu_stime_ticks? + self.cpu_utime_ticks?)
    }

    fn require_comparable(&self, other: &Self) -> Result<(), MeasureError> {
        if self.common.id != other.common.id {
            return Err(MeasureError::SnapshotMismatch);
        }
        Ok(())
    }
}

/// Parses `(utime, stime)` — fields 14 and 15 — out of a
/// `proc/<pid>/stat` line.
///
/// The comm field (field 2) is parenthesised and may itself contain spaces
/// or parentheses, so fields are counted from the *last* closing
/// parenthesis.
fn read_proc_cpu_ticks(path: &Path) -> Result<(i64, i64), SourceError> {
    let content = std::fs::read_to_string(path).map_err(|e| SourceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    let parse_err = |detail: String| SourceError::Parse {
        path: path.display().to_string(),
        detail,
    };

    let after_comm = content
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .ok_or_else(|| parse_err("no comm field".to_string()))?;

    // after_comm starts at field 3 (state); utime and stime are fields
    // 14 and 15 of the full line.
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    if fields.len() < 13 {
        return Err(parse_err(format!(
            "expected at least 15 stat fields, got {}",
            fields.len() + 2
        )));
    }
    let utime = fields[11]
        .parse::<i64>()
        .map_err(|_| parse_err(format!("bad utime '{}'", fields[11])))?;
    let stime = fields[12]
        .parse::<i64>()
        .map_err(|_| parse_err(format!("bad stime '{}'", fields[12])))?;
    Ok((utime, stime))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_SMAPS: &str = "\
08048000-0804c000 r-xp 00000000 03:02 13130      /usr/bin/fixture
Size:                400 kB
Rss:                 300 kB
Pss:                 250 kB
Shared_Clean:        100 kB
Shared_Dirty:         20 kB
Private_Clean:        50 kB
Private_Dirty:       130 kB
Referenced:          280 kB
Swap:                 40 kB
b7f00000-b7f80000 rw-p 00000000 00:00 0          [heap]
Size:                600 kB
Rss:                 500 kB
Pss:                 450 kB
Shared_Clean:          0 kB
Shared_Dirty:          0 kB
Private_Clean:        60 kB
Private_Dirty:       440 kB
Referenced:          320 kB
Swap:                 10 kB
";

    const FIXTURE_STAT: &str = "25268 (fixture proc) S 1 25268 25268 0 -1 4202496 1456 0 3 0 262287 47282 0 0 20 0 45 0 12345 0 0 18446744073709551615 0 0\n";

    fn fixture_proc(name: &str, pid: i32) -> (FsRoot, PathBuf) {
        let base = std::env::temp_dir().join(format!(
            "measure_core_proc_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&base);
        let proc_dir = base.join(format!("proc/{pid}"));
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("smaps"), FIXTURE_SMAPS).unwrap();
        std::fs::write(proc_dir.join("stat"), FIXTURE_STAT).unwrap();
        std::fs::write(proc_dir.join("cmdline"), b"/usr/bin/fixture\0--flag\0" as &[u8])
            .unwrap();
        (FsRoot::at(&base), base)
    }

    #[test]
    fn test_initial_resolves_identity() {
        let (root, base) = fixture_proc("init", 25268);
        let snap = ProcessSnapshot::initial(25268, &root).unwrap();
        assert_eq!(snap.common().pid(), 25268);
        assert_eq!(snap.common().name().as_deref(), Some("fixture --flag"));
        assert!(snap.common().smaps_path().ends_with("proc/25268/smaps"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_initial_missing_process() {
        let root = FsRoot::at("/nonexistent/rootfs");
        assert!(matches!(
            ProcessSnapshot::initial(42, &root),
            Err(MeasureError::ProcessVanished { pid: 42 })
        ));
    }

    #[test]
    fn test_refresh_sums_smaps_mappings() {
        let (root, base) = fixture_proc("smaps", 25268);
        let mut snap = ProcessSnapshot::initial(25268, &root).unwrap();
        let failed = snap.refresh(ProcResources::ALL, Some("first")).unwrap();
        assert!(failed.is_empty());

        assert_eq!(snap.label(), Some("first"));
        assert_eq!(snap.mem_size_kb(), Some(1000));
        assert_eq!(snap.mem_rss_kb(), Some(800));
        assert_eq!(snap.mem_pss_kb(), Some(700));
        assert_eq!(snap.mem_shared_clean_kb(), Some(100));
        assert_eq!(snap.mem_shared_dirty_kb(), Some(20));
        assert_eq!(snap.mem_private_clean_kb(), Some(110));
        assert_eq!(snap.mem_private_dirty_kb(), Some(570));
        assert_eq!(snap.mem_referenced_kb(), Some(600));
        assert_eq!(snap.mem_swap_kb(), Some(50));
        assert_eq!(snap.mem_private_dirty_sum_kb(), Some(620));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_refresh_reads_cpu_ticks() {
        let (root, base) = fixture_proc("stat", 25268);
        let mut snap = ProcessSnapshot::initial(25268, &root).unwrap();
        snap.refresh(ProcResources::CPU_USAGE, None).unwrap();
        assert_eq!(snap.cpu_utime_ticks(), Some(262287));
        assert_eq!(snap.cpu_stime_ticks(), Some(47282));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_refresh_vanished_process_is_untouched() {
        let (root, base) = fixture_proc("vanish", 25268);
        let mut snap = ProcessSnapshot::initial(25268, &root).unwrap();
        snap.refresh(ProcResources::ALL, Some("before")).unwrap();

        std::fs::remove_file(base.join("proc/25268/stat")).unwrap();
        let result = snap.refresh(ProcResources::ALL, Some("after"));
        assert!(matches!(
            result,
            Err(MeasureError::ProcessVanished { pid: 25268 })
        ));
        // No side effects: the label and counters are as before.
        assert_eq!(snap.label(), Some("before"));
        assert_eq!(snap.cpu_utime_ticks(), Some(262287));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_refresh_partial_failure_resets_memory_fields() {
        let (root, base) = fixture_proc("partial", 25268);
        let mut snap = ProcessSnapshot::initial(25268, &root).unwrap();
        snap.refresh(ProcResources::ALL, None).unwrap();

        std::fs::remove_file(base.join("proc/25268/smaps")).unwrap();
        let failed = snap.refresh(ProcResources::ALL, None).unwrap();
        assert!(failed.contains(ProcResources::MEM_USAGE));
        assert!(!failed.contains(ProcResources::CPU_USAGE));
        assert_eq!(snap.mem_private_dirty_kb(), None);
        assert_eq!(snap.mem_private_dirty_sum_kb(), None);
        assert_eq!(snap.cpu_utime_ticks(), Some(262287));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_sibling_shares_common_data() {
        let (root, base) = fixture_proc("sibling", 25268);
        let first = ProcessSnapshot::initial(25268, &root).unwrap();
        let second = first.sibling();
        assert!(first.shares_common(&second));
        assert_eq!(first.common_refs(), 2);
        drop(second);
        assert_eq!(first.common_refs(), 1);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_deltas() {
        let (root, base) = fixture_proc("deltas", 25268);
        let mut earlier = ProcessSnapshot::initial(25268, &root).unwrap();
        earlier.refresh(ProcResources::ALL, None).unwrap();

        let mut later = earlier.sibling();
        later.refresh(ProcResources::ALL, None).unwrap();
        later.mem_private_dirty_kb = Some(600);
        later.mem_swap_kb = Some(30);
        later.cpu_utime_ticks = Some(262479);
        later.cpu_stime_ticks = Some(47299);

        // (600 + 30) - (570 + 50) = 10
        assert_eq!(later.mem_private_dirty_delta_kb(&earlier).unwrap(), 10);
        // (262479 + 47299) - (262287 + 47282) = 209
        assert_eq!(later.cpu_ticks_delta(&earlier).unwrap(), 209);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_deltas_reject_different_common_data() {
        let (root, base) = fixture_proc("mismatch", 25268);
        let mut a = ProcessSnapshot::initial(25268, &root).unwrap();
        let mut b = ProcessSnapshot::initial(25268, &root).unwrap();
        a.refresh(ProcResources::ALL, None).unwrap();
        b.refresh(ProcResources::ALL, None).unwrap();

        assert!(matches!(
            b.mem_private_dirty_delta_kb(&a),
            Err(MeasureError::SnapshotMismatch)
        ));
        assert!(matches!(
            b.cpu_ticks_delta(&a),
            Err(MeasureError::SnapshotMismatch)
        ));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_deltas_require_defined_fields() {
        let (root, base) = fixture_proc("undef", 25268);
        let mut earlier = ProcessSnapshot::initial(25268, &root).unwrap();
        earlier.refresh(ProcResources::ALL, None).unwrap();
        let later = earlier.sibling(); // never refreshed

        assert!(matches!(
            later.mem_private_dirty_delta_kb(&earlier),
            Err(MeasureError::UndefinedField { .. })
        ));
        assert!(matches!(
            later.cpu_ticks_delta(&earlier),
            Err(MeasureError::UndefinedField { .. })
        ));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_refresh_identity() {
        let (root, base) = fixture_proc("reident", 25268);
        let snap = ProcessSnapshot::initial(25268, &root).unwrap();
        assert_eq!(snap.common().name().as_deref(), Some("fixture --flag"));

        std::fs::write(
            base.join("proc/25268/cmdline"),
            b"/usr/bin/renamed\0" as &[u8],
        )
        .unwrap();
        snap.refresh_identity();
        assert_eq!(snap.common().name().as_deref(), Some("renamed"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_stat_parse_comm_with_spaces_and_parens() {
        let dir = std::env::temp_dir().join(format!(
            "measure_core_proc_comm_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stat");
        std::fs::write(
            &path,
            "77 (a (weird) name) R 1 77 77 0 -1 0 0 0 0 0 11 22 0 0 20 0 1 0 100 0 0\n",
        )
        .unwrap();
        assert_eq!(read_proc_cpu_ticks(&path).unwrap(), (11, 22));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stat_parse_truncated() {
        let dir = std::env::temp_dir().join(format!(
            "measure_core_proc_trunc_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stat");
        std::fs::write(&path, "77 (short) R 1 77\n").unwrap();
        assert!(matches!(
            read_proc_cpu_ticks(&path),
            Err(SourceError::Parse { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
