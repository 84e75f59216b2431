// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Redirectable filesystem root.
//!
//! Every reader in this crate takes paths relative to a root directory that
//! normally is `/`. An [`FsRoot`] pointing somewhere else redirects the
//! whole `/proc` + `/sys` surface into a substitute tree — saved captures
//! for offline analysis, or generated fixtures in tests.
//!
//! The root is an explicit value passed to whoever resolves paths, not a
//! process-wide setting. Consumers that resolve and cache paths (snapshot
//! common data) keep the paths they resolved; building a different `FsRoot`
//! afterwards does not reach back into them.

use std::path::{Path, PathBuf};

/// The directory standing in for `/` when resolving kernel interface paths.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FsRoot {
    /// `None` means the real filesystem root.
    base: Option<PathBuf>,
}

impl FsRoot {
    /// The real filesystem root, `/`.
    pub fn real() -> Self {
        Self { base: None }
    }

    /// A substitute root directory. Relative kernel paths such as
    /// `proc/meminfo` resolve beneath it.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    /// Resolves a kernel interface path (given relative, e.g.
    /// `proc/meminfo`) against this root.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        match &self.base {
            Some(base) => base.join(relative),
            None => Path::new("/").join(relative),
        }
    }

    /// Returns `true` if this root points at a substitute tree.
    pub fn is_redirected(&self) -> bool {
        self.base.is_some()
    }
}

impl Default for FsRoot {
    fn default() -> Self {
        Self::real()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_root() {
        let root = FsRoot::real();
        assert!(!root.is_redirected());
        assert_eq!(root.join("proc/meminfo"), PathBuf::from("/proc/meminfo"));
    }

    #[test]
    fn test_redirected_root() {
        let root = FsRoot::at("/tmp/rootfs1");
        assert!(root.is_redirected());
        assert_eq!(
            root.join("proc/meminfo"),
            PathBuf::from("/tmp/rootfs1/proc/meminfo")
        );
    }

    #[test]
    fn test_default_is_real() {
        assert_eq!(FsRoot::default(), FsRoot::real());
    }
}
