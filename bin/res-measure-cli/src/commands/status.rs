// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `res-measure status`: one-shot snapshot of current system state.

use crate::config::MonitorConfig;
use measure_core::{SysResources, SystemSnapshot, MEM_WATERMARK_HIGH, MEM_WATERMARK_LOW};

/// Everything the status report shows, in one serializable struct.
#[derive(Debug, serde::Serialize)]
struct StatusReport {
    mem_total_kb: Option<i64>,
    swap_total_kb: Option<i64>,
    cpu_max_freq_khz: Option<i64>,
    mem_free_kb: Option<i64>,
    mem_buffers_kb: Option<i64>,
    mem_cached_kb: Option<i64>,
    mem_used_kb: Option<i64>,
    mem_watermark: Option<i32>,
    cpu_ticks_total: Option<i64>,
    cpu_ticks_idle: Option<i64>,
    freq_states: usize,
    failed_groups: String,
}

pub fn execute(config: &MonitorConfig, json: bool) -> anyhow::Result<()> {
    let root = config.fs_root();
    let (mut snap, init_failed) = SystemSnapshot::initial(SysResources::COMMON, &root);
    let refresh_failed = snap.refresh(
        SysResources::SNAPSHOT | SysResources::WATERMARK,
        Some("status"),
    );
    let failed = init_failed | refresh_failed;

    let report = StatusReport {
        mem_total_kb: snap.common().mem_total_kb(),
        swap_total_kb: snap.common().swap_total_kb(),
        cpu_max_freq_khz: snap.common().cpu_max_freq_khz(),
        mem_free_kb: snap.mem_free_kb(),
        mem_buffers_kb: snap.mem_buffers_kb(),
        mem_cached_kb: snap.mem_cached_kb(),
        mem_used_kb: snap.mem_used_kb(),
        mem_watermark: snap.mem_watermark(),
        cpu_ticks_total: snap.cpu_ticks_total(),
        cpu_ticks_idle: snap.cpu_ticks_idle(),
        freq_states: snap.freq_residency().len(),
        failed_groups: failed.to_string(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("System resource status");
    println!();
    println!("  Memory");
    println!("   Total:        {}", fmt_kb(report.mem_total_kb));
    println!("   Swap total:   {}", fmt_kb(report.swap_total_kb));
    println!("   Free:         {}", fmt_kb(report.mem_free_kb));
    println!("   Buffers:      {}", fmt_kb(report.mem_buffers_kb));
    println!("   Cached:       {}", fmt_kb(report.mem_cached_kb));
    println!("   Used:         {}", fmt_kb(report.mem_used_kb));
    if let Some(mask) = report.mem_watermark {
        let low = mask & MEM_WATERMARK_LOW != 0;
        let high = mask & MEM_WATERMARK_HIGH != 0;
        println!("   Watermarks:   low={low} high={high}");
    }
    println!();
    println!("  CPU");
    println!(
        "   Max freq:     {}",
        match report.cpu_max_freq_khz {
            Some(khz) => format!("{} MHz", khz / 1000),
            None => "unavailable".to_string(),
        }
    );
    println!(
        "   Ticks:        {} total, {} idle",
        fmt_plain(report.cpu_ticks_total),
        fmt_plain(report.cpu_ticks_idle)
    );
    println!("   Freq states:  {}", report.freq_states);

    if !failed.is_empty() {
        println!();
        println!("  WARNING: failed resource groups: {failed}");
    }
    Ok(())
}

fn fmt_kb(value: Option<i64>) -> String {
    match value {
        Some(v) => format!("{v} KB"),
        None => "unavailable".to_string(),
    }
}

fn fmt_plain(value: Option<i64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unavailable".to_string(),
    }
}
