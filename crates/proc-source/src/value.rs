// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-integer file reader.
//!
//! Many kernel interfaces expose exactly one number per file
//! (`cpuinfo_max_freq`, cgroup usage counters, the Maemo watermark flags).
//! [`read_int`] reads the leading integer and ignores whatever follows it,
//! so counters with trailing annotations still parse.

use crate::SourceError;
use std::path::Path;

/// Reads the file at `path` and parses its leading integer.
pub fn read_int(path: &Path) -> Result<i64, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotAvailable {
            path: path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| SourceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_leading_int(&content).ok_or_else(|| SourceError::Parse {
        path: path.display().to_string(),
        detail: format!("expected integer, got '{}'", content.trim()),
    })
}

/// Parses an optionally signed integer prefix of `s`, skipping leading
/// whitespace.
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    s[..digits_end].parse::<i64>().ok()
}
