// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process liveness and display-name resolution.
//!
//! A process exists for our purposes while `proc/<pid>/stat` does. The
//! display name comes from `proc/<pid>/cmdline` — NUL-separated invocation
//! arguments, of which the first is reduced to its basename — and falls
//! back to the bracketed short name from `proc/<pid>/status` for kernel
//! threads and processes whose cmdline is empty.

use crate::FsRoot;

/// Returns `true` while the process's `stat` file exists under `root`.
pub fn alive(root: &FsRoot, pid: i32) -> bool {
    root.join(format!("proc/{pid}/stat")).exists()
}

/// Resolves the display name of `pid`.
///
/// From `cmdline`: the basename of the first argument, followed by the
/// remaining arguments space-separated (`"cat /etc/fstab"`). When the
/// cmdline is missing or empty, from the `Name:` line of `status`,
/// bracketed (`"[kswapd0]"`). `None` when neither source yields a name.
pub fn display_name(root: &FsRoot, pid: i32) -> Option<String> {
    if let Some(name) = name_from_cmdline(root, pid) {
        return Some(name);
    }
    name_from_status(root, pid)
}

fn name_from_cmdline(root: &FsRoot, pid: i32) -> Option<String> {
    let raw = std::fs::read(root.join(format!("proc/{pid}/cmdline"))).ok()?;
    let mut args = raw
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned());

    let argv0 = args.next()?;
    let mut name = argv0.rsplit('/').next().unwrap_or(&argv0).to_string();
    if name.is_empty() {
        return None;
    }
    for arg in args {
        name.push(' ');
        name.push_str(&arg);
    }
    Some(name)
}

fn name_from_status(root: &FsRoot, pid: i32) -> Option<String> {
    let content = std::fs::read_to_string(root.join(format!("proc/{pid}/status"))).ok()?;
    let first = content.lines().next()?;
    let short = first.strip_prefix("Name:")?.trim();
    if short.is_empty() {
        return None;
    }
    Some(format!("[{short}]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Builds a fake `proc/<pid>/` directory and returns the root above it.
    fn fake_proc(pid: i32, cmdline: Option<&[u8]>, status: Option<&str>) -> (FsRoot, PathBuf) {
        let base = std::env::temp_dir().join(format!(
            "proc_source_test_proc_{pid}_{}",
            std::process::id()
        ));
        let proc_dir = base.join(format!("proc/{pid}"));
        std::fs::create_dir_all(&proc_dir).unwrap();
        if let Some(bytes) = cmdline {
            std::fs::write(proc_dir.join("cmdline"), bytes).unwrap();
        }
        if let Some(text) = status {
            std::fs::write(proc_dir.join("status"), text).unwrap();
        }
        (FsRoot::at(&base), base)
    }

    #[test]
    fn test_alive_requires_stat() {
        let (root, base) = fake_proc(100, Some(b"/bin/true\0"), None);
        assert!(!alive(&root, 100));
        std::fs::write(base.join("proc/100/stat"), "100 (true) S 1").unwrap();
        assert!(alive(&root, 100));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_name_from_cmdline_with_args() {
        let (root, base) = fake_proc(101, Some(b"/usr/bin/cat\0/etc/fstab\0"), None);
        assert_eq!(display_name(&root, 101).as_deref(), Some("cat /etc/fstab"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_name_basename_only() {
        let (root, base) = fake_proc(102, Some(b"eclipse\0"), None);
        assert_eq!(display_name(&root, 102).as_deref(), Some("eclipse"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_empty_cmdline_falls_back_to_status() {
        let (root, base) = fake_proc(103, Some(b""), Some("Name:\tkswapd0\nState: S\n"));
        assert_eq!(display_name(&root, 103).as_deref(), Some("[kswapd0]"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_missing_cmdline_falls_back_to_status() {
        let (root, base) = fake_proc(104, None, Some("Name:\tmigration/0\n"));
        assert_eq!(display_name(&root, 104).as_deref(), Some("[migration/0]"));
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_no_sources_yields_none() {
        let (root, base) = fake_proc(105, None, None);
        assert_eq!(display_name(&root, 105), None);
        let _ = std::fs::remove_dir_all(&base);
    }
}
