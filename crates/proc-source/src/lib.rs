// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # proc-source
//!
//! Thin readers for the Linux `/proc` and `/sys` text interfaces, used by
//! `measure-core` to populate resource snapshots.
//!
//! # Components
//! - [`FsRoot`] — an explicit, cloneable filesystem-root value. The default
//!   root is `/`; pointing it at a saved directory tree redirects every
//!   reader, which is how offline analysis and the test fixtures work.
//! - [`kvfile`] — scans line-oriented `Key: value` tables (`meminfo`,
//!   `smaps`) into caller-supplied slots.
//! - [`value`] — reads a single integer from a file (`cpuinfo_max_freq`,
//!   cgroup usage counters).
//! - [`process`] — process liveness checks and display-name resolution
//!   from `cmdline`/`status`.
//!
//! Paths handed to the readers are resolved through an [`FsRoot`] exactly
//! once, at the call site that owns the root. Consumers that cache resolved
//! paths (snapshot common data does) are deliberately unaffected by a root
//! created later.
//!
//! # Example
//! ```no_run
//! use proc_source::{kvfile::KeyQuery, FsRoot};
//!
//! let root = FsRoot::default();
//! let mut queries = [KeyQuery::new("MemTotal"), KeyQuery::new("SwapTotal")];
//! let matched =
//!     proc_source::kvfile::read_first_match(&root.join("proc/meminfo"), &mut queries)?;
//! assert_eq!(matched, 2);
//! # Ok::<(), proc_source::SourceError>(())
//! ```

mod error;
pub mod kvfile;
pub mod process;
mod root;
pub mod value;

pub use error::SourceError;
pub use root::FsRoot;
