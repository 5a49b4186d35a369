// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Shared data model for the mockmesh traffic-mirroring pipeline.
//!
//! Every other `mm-*` crate exchanges one of the types defined here across
//! its boundary: `mm-ingest` produces [`TrafficEvent`], `mm-sanitizer`
//! produces [`SanitizedEvent`], `mm-fingerprint` produces [`Fingerprint`] and
//! [`DedupEntry`], `mm-stub` produces [`Stub`], `mm-streamqueue` wraps a stub
//! in a [`QueueMessage`], and `mm-backup` mirrors both to a [`BackupRecord`].

mod backup;
mod cancel;
mod event;
mod fingerprint;
mod queue;
mod stub;

pub use backup::{BackupId, BackupRecord};
pub use cancel::CancellationToken;
pub use event::{header_get, BodyData, HeaderList, RequestData, ResponseData, SanitizedEvent, SourceIdentity, TrafficEvent};
pub use fingerprint::{DedupEntry, Fingerprint};
pub use queue::{DlqRecord, QueueMessage};
pub use stub::{BodyPattern, HeaderMatcher, MatchSpec, Provenance, QueryMatcher, ResponseSpec, Stub};

/// Wire-contract version for [`TrafficEvent`] and [`Stub`] documents.
///
/// Bumped whenever a field is added or removed from a type that crosses a
/// process boundary (ingest wire format, stub queue payload, backup file).
pub const CONTRACT_VERSION: &str = "1";

/// Fixed sentinel substituted for fully-redacted sensitive content.
///
/// Used by the sanitizer for non-structured matches and by the stub builder
/// to recognize already-redacted values it must not re-emit as match
/// headers (see `mm_sanitizer` and `mm_stub`).
pub const SANITIZED_SENTINEL: &str = "SANITIZED";
