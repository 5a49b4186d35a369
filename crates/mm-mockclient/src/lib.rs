// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! HTTP client for the downstream mock server's admin API (C8, §4.8).
//!
//! Mirrors `wiremock_client.py`'s `WireMockClient`: a thin `reqwest` wrapper
//! around the admin API's `/__admin/mappings` and `/__admin/requests`
//! surface, with pre-send validation (no network call for a malformed
//! [`mm_core::Stub`]), bounded concurrency, and the same retry/backoff policy
//! the queue consumer uses (`mm_retry::ExponentialBackoff::mock_client_default`).

mod client;
mod error;

pub use client::{ApplyBatchResult, MockClient, MockClientConfig};
pub use error::MockClientError;
