// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the kernel-interface readers.

/// Errors that can occur when reading a `/proc` or `/sys` file.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Failed to open or read a kernel interface file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// The file was readable but its content was not in the expected shape.
    #[error("failed to parse value from {path}: {detail}")]
    Parse { path: String, detail: String },

    /// The expected kernel interface path does not exist on this system.
    #[error("kernel interface not found: {path}")]
    NotAvailable { path: String },
}
