// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `res-measure monitor`: the interval delta-printing loop.
//!
//! Keeps two snapshots per monitored target sharing one common data. Each
//! round refreshes the scratch snapshot, prints the deltas against the
//! previous one, then swaps the pair — the freshly taken snapshot becomes
//! the baseline for the next round.

use crate::config::MonitorConfig;
use anyhow::Context;
use measure_core::{ProcResources, ProcessSnapshot, SysResources, SystemSnapshot};

pub fn execute(config: &MonitorConfig) -> anyhow::Result<()> {
    let root = config.fs_root();

    let (mut sys_prev, failed) = SystemSnapshot::initial(SysResources::COMMON, &root);
    if !failed.is_empty() {
        tracing::warn!(failed = %failed, "some system parameters are unavailable");
    }
    let mut sys_next = sys_prev.sibling();

    let mut sys_sample = SysResources::SNAPSHOT;
    if let Some(pattern) = &config.cgroup {
        let selected = sys_prev.select_cgroup(pattern);
        tracing::info!(group = %selected.display(), "control group selected");
        sys_sample |= SysResources::CGROUP_MEM;
    }

    let mut proc_pair = match config.pid {
        Some(pid) => {
            let prev = ProcessSnapshot::initial(pid, &root)
                .with_context(|| format!("cannot monitor process {pid}"))?;
            let next = prev.sibling();
            Some((prev, next))
        }
        None => None,
    };

    // Baseline sample.
    sys_prev.refresh(sys_sample, None);
    if let Some((prev, _)) = proc_pair.as_mut() {
        prev.refresh(ProcResources::ALL, None)?;
    }

    print_header(proc_pair.as_ref().map(|(prev, _)| prev));

    let mut remaining = config.count;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(config.interval_ms));

        sys_next.refresh(sys_sample, None);
        print_system_row(&sys_prev, &sys_next);

        if let Some((prev, next)) = proc_pair.as_mut() {
            next.refresh(ProcResources::ALL, None)
                .context("monitored process vanished")?;
            print_process_row(prev, next, &sys_prev, &sys_next);
        }
        println!();

        // The fresh snapshot becomes the next round's baseline.
        std::mem::swap(&mut sys_prev, &mut sys_next);
        if let Some((prev, next)) = proc_pair.as_mut() {
            std::mem::swap(prev, next);
        }

        if config.count > 0 {
            remaining -= 1;
            if remaining == 0 {
                return Ok(());
            }
        }
    }
}

fn print_header(proc_snapshot: Option<&ProcessSnapshot>) {
    print!("System:");
    if let Some(snap) = proc_snapshot {
        print!(
            "                        {} {}",
            snap.common().pid(),
            snap.common().name().unwrap_or_else(|| "?".to_string())
        );
    }
    println!();
    print!("used mem: change:  cpu%: freq:  ");
    if proc_snapshot.is_some() {
        print!("clean:   dirty:  change:  cpu%:");
    }
    println!();
}

fn print_system_row(prev: &SystemSnapshot, next: &SystemSnapshot) {
    let used = fmt_count(next.mem_used_kb(), 8);
    let change = fmt_signed(next.mem_used_delta_kb(prev).ok(), 8);
    let usage = fmt_percent(next.cpu_usage_basis_points(prev).ok(), 5);
    let freq_mhz = fmt_count(next.cpu_avg_freq_khz(prev).ok().map(|khz| khz / 1000), 5);
    print!("{used} {change} {usage} {freq_mhz}");
}

fn print_process_row(
    prev: &ProcessSnapshot,
    next: &ProcessSnapshot,
    sys_prev: &SystemSnapshot,
    sys_next: &SystemSnapshot,
) {
    let clean = fmt_count(next.mem_private_clean_kb(), 8);
    let dirty = fmt_count(next.mem_private_dirty_sum_kb(), 8);
    let change = fmt_signed(next.mem_private_dirty_delta_kb(prev).ok(), 8);

    // Process share of the elapsed CPU ticks.
    let share = match (
        next.cpu_ticks_delta(prev).ok(),
        sys_next.cpu_ticks_delta(sys_prev).ok(),
    ) {
        (Some(proc_ticks), Some(sys_ticks)) if sys_ticks != 0 => {
            Some(proc_ticks * 10_000 / sys_ticks)
        }
        (Some(_), Some(_)) => Some(0),
        _ => None,
    };
    let share = fmt_percent(share, 5);

    print!("  {clean} {dirty} {change} {share}");
}

/// Right-aligns a value, or `-` when the reading is unavailable.
fn fmt_count(value: Option<i64>, width: usize) -> String {
    match value {
        Some(v) => format!("{v:>width$}"),
        None => format!("{:>width$}", "-"),
    }
}

fn fmt_signed(value: Option<i64>, width: usize) -> String {
    match value {
        Some(v) => format!("{v:>+width$}"),
        None => format!("{:>width$}", "-"),
    }
}

/// Formats basis points as a percentage with one decimal, e.g. `  8.3%`.
fn fmt_percent(basis_points: Option<i64>, width: usize) -> String {
    match basis_points {
        Some(bp) => format!("{:>width$.1}%", bp as f64 / 100.0),
        None => format!("{:>width$}%", "-"),
    }
}
