// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # measure-core
//!
//! Point-in-time snapshots of system and process resource usage, and the
//! delta calculations between them. Built for sampling-interval monitoring
//! (once a second or so) on top of the Linux `/proc` + `/sys` text
//! interfaces, with no daemon and no background threads.
//!
//! # Ownership Model
//!
//! Each monitored target — the machine, or one process — has values that
//! never change between samples (total memory, max CPU frequency, pid,
//! resolved file paths) and values that change every sample. The former
//! live once in a *common data* struct shared via `Arc` by every snapshot
//! derived from the same initialization:
//!
//! ```text
//! SystemSnapshot::initial()          SystemSnapshot::sibling()
//!       │                                  │
//!       ▼                                  ▼
//!   snapshot A ──► Arc<CommonSystemData> ◄── snapshot B
//!                     (dropped with the last snapshot)
//! ```
//!
//! Deltas are only defined between snapshots holding the *same* common
//! data — an identity carried as an opaque token, checked by every delta
//! operation. Snapshots of different targets share no state and can be
//! driven from different threads; one target's refresh-and-diff sequence
//! belongs on one thread.
//!
//! # Partial Failure
//!
//! Refreshes read each requested resource group independently and report
//! the failed ones in a returned [`SysResources`]/[`ProcResources`] mask.
//! A failed group's fields read back as `None` — never a stale value —
//! and any delta touching them returns
//! [`MeasureError::UndefinedField`].
//!
//! # Example
//! ```no_run
//! use measure_core::{ProcResources, ProcessSnapshot, SysResources, SystemSnapshot};
//! use proc_source::FsRoot;
//!
//! let root = FsRoot::default();
//! let (mut sys_a, _) = SystemSnapshot::initial(SysResources::COMMON, &root);
//! let mut sys_b = sys_a.sibling();
//! let mut proc_a = ProcessSnapshot::initial(1, &root)?;
//! let mut proc_b = proc_a.sibling();
//!
//! sys_a.refresh(SysResources::SNAPSHOT, None);
//! proc_a.refresh(ProcResources::ALL, None)?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! sys_b.refresh(SysResources::SNAPSHOT, None);
//! proc_b.refresh(ProcResources::ALL, None)?;
//!
//! println!("cpu {} bp", sys_b.cpu_usage_basis_points(&sys_a)?);
//! println!("avg {} kHz", sys_b.cpu_avg_freq_khz(&sys_a)?);
//! println!("proc mem {:+} KB", proc_b.mem_private_dirty_delta_kb(&proc_a)?);
//! # Ok::<(), measure_core::MeasureError>(())
//! ```

mod cgroup;
mod error;
mod freq;
mod process;
mod resources;
mod system;

pub use error::MeasureError;
pub use freq::{FreqResidency, FreqTicks};
pub use process::{CommonProcessData, ProcessSnapshot};
pub use resources::{ProcResources, SysResources};
pub use system::{
    CommonSystemData, SystemSnapshot, MEM_WATERMARK_HIGH, MEM_WATERMARK_LOW,
};

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out the identity tokens embedded in common data. Identity — not
/// pointer equality — is what makes two snapshots comparable.
pub(crate) fn next_common_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
