// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Monitor configuration loaded from TOML files or built from CLI flags.
//!
//! # TOML Format
//! ```toml
//! interval_ms = 1000
//! count = 0
//! pid = 1234
//! cgroup = "standby"
//! root = "./captured-rootfs"
//! ```

use std::path::{Path, PathBuf};

/// Configuration for the monitor loop. CLI flags override file values.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MonitorConfig {
    /// Sampling interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Number of samples to print; 0 runs until interrupted.
    #[serde(default)]
    pub count: u64,
    /// Process to monitor alongside the system, if any.
    #[serde(default)]
    pub pid: Option<i32>,
    /// Control-group name pattern for cgroup memory accounting.
    #[serde(default)]
    pub cgroup: Option<String>,
    /// Substitute filesystem root; `None` is the real `/`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_interval_ms() -> u64 {
    1000
}

impl MonitorConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("cannot read config '{}': {e}", path.display())
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).map_err(|e| anyhow::anyhow!("TOML parse error: {e}"))
    }

    /// Resolves the filesystem root to read through.
    pub fn fs_root(&self) -> proc_source::FsRoot {
        match &self.root {
            Some(path) => proc_source::FsRoot::at(path),
            None => proc_source::FsRoot::real(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            count: 0,
            pid: None,
            cgroup: None,
            root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = MonitorConfig::default();
        assert_eq!(c.interval_ms, 1000);
        assert_eq!(c.count, 0);
        assert!(c.pid.is_none());
        assert!(!c.fs_root().is_redirected());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
interval_ms = 250
count = 5
pid = 1234
cgroup = "standby"
root = "/tmp/rootfs"
"#;
        let c = MonitorConfig::from_toml(toml).unwrap();
        assert_eq!(c.interval_ms, 250);
        assert_eq!(c.count, 5);
        assert_eq!(c.pid, Some(1234));
        assert_eq!(c.cgroup.as_deref(), Some("standby"));
        assert!(c.fs_root().is_redirected());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let c = MonitorConfig::from_toml("pid = 42\n").unwrap();
        assert_eq!(c.interval_ms, 1000);
        assert_eq!(c.pid, Some(42));
        assert!(c.root.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(MonitorConfig::from_toml("interval_ms = \"soon\"").is_err());
    }
}
