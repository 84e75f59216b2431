// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resource-group selection and failure masks.
//!
//! Snapshot operations take a mask naming the resource groups to populate
//! and return a mask naming the groups whose reads failed. An empty
//! returned mask is full success; a non-empty one means the listed groups'
//! fields were set to "unread" while everything else proceeded normally.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! resource_mask {
    ($(#[$doc:meta])* $name:ident { $($(#[$fdoc:meta])* $flag:ident = $bit:expr => $label:literal,)+ }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
        pub struct $name(u32);

        impl $name {
            /// The empty mask.
            pub const NONE: Self = Self(0);

            $($(#[$fdoc])* pub const $flag: Self = Self(1 << $bit);)+

            /// Every group.
            pub const ALL: Self = Self($((1 << $bit))|+);

            /// Returns `true` if every group in `other` is set in `self`.
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Adds the groups in `other` to `self`.
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Returns `true` if no group is set.
            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_empty() {
                    return write!(f, "none");
                }
                let mut first = true;
                $(
                    if self.contains(Self::$flag) {
                        if !first {
                            f.write_str("|")?;
                        }
                        f.write_str($label)?;
                        first = false;
                    }
                )+
                let _ = first;
                Ok(())
            }
        }
    };
}

resource_mask! {
    /// System snapshot resource groups.
    ///
    /// `MEM_TOTALS`, `CPU_MAX_FREQ` and `CGROUP` populate the shared
    /// common data and only apply at initialization; the rest apply on
    /// every refresh.
    SysResources {
        /// Total memory and swap from the meminfo table (init-time).
        MEM_TOTALS = 0 => "mem-totals",
        /// Maximum CPU frequency from cpufreq (init-time).
        CPU_MAX_FREQ = 1 => "cpu-max-freq",
        /// Default control-group root selection (init-time).
        CGROUP = 2 => "cgroup",
        /// Snapshot timestamp, milliseconds since midnight.
        TIMESTAMP = 3 => "timestamp",
        /// Free/buffers/cached/swap memory usage.
        MEM_USAGE = 4 => "mem-usage",
        /// Control-group memory usage under the selected group root.
        CGROUP_MEM = 5 => "cgroup-mem",
        /// Kernel low/high memory watermark flags.
        WATERMARK = 6 => "watermark",
        /// Total and idle CPU tick counters.
        CPU_USAGE = 7 => "cpu-usage",
        /// Per-frequency residency tick counters.
        CPU_FREQ = 8 => "cpu-freq",
    }
}

impl SysResources {
    /// The init-time groups: everything stored in the shared common data.
    pub const COMMON: Self = Self(Self::MEM_TOTALS.0 | Self::CPU_MAX_FREQ.0);

    /// The usual per-sample set: timestamp, memory usage, CPU usage and
    /// frequency residency. Watermarks and control-group accounting are
    /// opt-in.
    pub const SNAPSHOT: Self = Self(
        Self::TIMESTAMP.0 | Self::MEM_USAGE.0 | Self::CPU_USAGE.0 | Self::CPU_FREQ.0,
    );
}

resource_mask! {
    /// Process snapshot resource groups.
    ProcResources {
        /// The nine smaps memory totals.
        MEM_USAGE = 0 => "mem-usage",
        /// User and system CPU tick counters from the stat file.
        CPU_USAGE = 1 => "cpu-usage",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_all() {
        assert!(SysResources::NONE.is_empty());
        assert!(!SysResources::ALL.is_empty());
        assert!(SysResources::ALL.contains(SysResources::CPU_FREQ));
        assert!(SysResources::ALL.contains(SysResources::SNAPSHOT));
    }

    #[test]
    fn test_union_and_contains() {
        let mask = SysResources::MEM_USAGE | SysResources::CPU_USAGE;
        assert!(mask.contains(SysResources::MEM_USAGE));
        assert!(mask.contains(SysResources::CPU_USAGE));
        assert!(!mask.contains(SysResources::TIMESTAMP));
        assert!(!SysResources::MEM_USAGE.contains(mask));
    }

    #[test]
    fn test_insert() {
        let mut failed = SysResources::NONE;
        failed.insert(SysResources::WATERMARK);
        failed |= SysResources::CPU_FREQ;
        assert!(failed.contains(SysResources::WATERMARK | SysResources::CPU_FREQ));
        assert!(!failed.contains(SysResources::MEM_USAGE));
    }

    #[test]
    fn test_snapshot_excludes_optin_groups() {
        assert!(!SysResources::SNAPSHOT.contains(SysResources::WATERMARK));
        assert!(!SysResources::SNAPSHOT.contains(SysResources::CGROUP_MEM));
    }

    #[test]
    fn test_display() {
        assert_eq!(SysResources::NONE.to_string(), "none");
        let mask = SysResources::MEM_USAGE | SysResources::CPU_FREQ;
        assert_eq!(mask.to_string(), "mem-usage|cpu-freq");
        assert_eq!(ProcResources::ALL.to_string(), "mem-usage|cpu-usage");
    }
}
