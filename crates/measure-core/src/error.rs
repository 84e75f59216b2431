// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for snapshot lifecycle and delta calculation.

/// Errors that can occur when building snapshots or computing deltas.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    /// A delta was requested between snapshots that do not share the same
    /// common data — they were initialized separately and are not
    /// comparable, whatever their field values.
    #[error("snapshots do not share the same monitored target")]
    SnapshotMismatch,

    /// A delta input field was never read (its resource group failed or
    /// was not requested) on at least one of the snapshots.
    #[error("field '{field}' has not been read on one of the snapshots")]
    UndefinedField { field: &'static str },

    /// The monitored process no longer exists.
    #[error("process {pid} no longer exists")]
    ProcessVanished { pid: i32 },

    /// A kernel interface read failed in a way that is not a per-group
    /// partial failure.
    #[error(transparent)]
    Source(#[from] proc_source::SourceError),
}
