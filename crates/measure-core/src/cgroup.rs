// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Control-group directory selection.
//!
//! Control groups are mounted as a directory tree under a fixed root;
//! selecting a group means finding the first directory whose path contains
//! a caller-supplied pattern as a substring. Sibling visiting order is
//! whatever the underlying directory iteration yields, so patterns should
//! be specific enough to match unambiguously.

use std::path::{Path, PathBuf};

/// The control-group mount point, relative to the filesystem root.
pub(crate) const CGROUP_FIXED_ROOT: &str = "syspart";

/// Recursion limit for the group search.
const MAX_DEPTH: usize = 32;

/// Searches the tree under `base` for the first directory whose path
/// contains `pattern`. Returns `None` when nothing matches or the tree
/// cannot be read.
pub(crate) fn find_group(base: &Path, pattern: &str) -> Option<PathBuf> {
    find_in(base, pattern, MAX_DEPTH)
}

fn find_in(dir: &Path, pattern: &str, depth_left: usize) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    if dir.to_string_lossy().contains(pattern) {
        return Some(dir.to_path_buf());
    }
    if depth_left == 0 {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_in(&path, pattern, depth_left - 1) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_tree(name: &str) -> PathBuf {
        let base = std::env::temp_dir().join(format!(
            "measure_core_cgroup_{name}_{}",
            std::process::id()
        ));
        for sub in [
            "applications/standby",
            "applications/background",
            "system/services",
        ] {
            std::fs::create_dir_all(base.join(sub)).unwrap();
        }
        base
    }

    #[test]
    fn test_finds_nested_directory() {
        let base = fixture_tree("nested");
        let found = find_group(&base, "standby").unwrap();
        assert!(found.ends_with("applications/standby"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_substring_match_on_full_path() {
        let base = fixture_tree("substr");
        let found = find_group(&base, "system/serv").unwrap();
        assert!(found.ends_with("system/services"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_no_match() {
        let base = fixture_tree("nomatch");
        assert_eq!(find_group(&base, "does-not-exist"), None);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_missing_base() {
        assert_eq!(
            find_group(Path::new("/nonexistent/cgroup/base"), "x"),
            None
        );
    }
}
