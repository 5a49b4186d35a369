// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The mirrored-traffic capture endpoint (C4, §4.4).
//!
//! The sidecar tap transport is treated as opaque; this crate exposes
//! its contract as `POST /v1/capture` over HTTP+JSON on `axum`, the same
//! framework the control surface (`mm-daemon`) uses. Message-boundary
//! framing is newline-delimited JSON; backpressure is a bounded channel to
//! the processor, surfaced as `503` with `Retry-After` when full.

mod server;

pub use server::{build_app, AppState};
