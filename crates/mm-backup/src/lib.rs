// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Date-partitioned, append-only mirror of every applied stub (C9, §4.9).
//!
//! A write-only archive under `<root>/YYYY/MM/DD/`, one file per applied
//! stub (or one per batch), optionally gzip-compressed via `flate2`, plus
//! a daily retention sweep.

mod store;

pub use store::{BackupError, BackupStore, RestoredBackup, BACKUP_VERSION};
