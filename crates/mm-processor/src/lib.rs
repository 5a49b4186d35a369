// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Filter→sanitize→dedupe→build→enqueue pipeline for captured traffic
//! (mockmesh C5, §4.5).
//!
//! Host/path/sampling pre-filtering happens upstream in `mm-ingest`
//! (§4.4) before an event ever reaches this crate — [`Processor`] only
//! implements the §4.5 core loop: sanitize, fingerprint, dedupe, build,
//! enqueue. [`BatchProcessor`] wraps it with the §4.5 batching policy:
//! flush on size or timeout, concurrent per-event processing, per-event
//! failure isolation.

mod batch;
mod processor;

pub use batch::{BatchConfig, BatchProcessor, BatchReport};
pub use processor::{Processor, ProcessorConfig, ProcessOutcome};
