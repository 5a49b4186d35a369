// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The durable stub stream (mockmesh C6): an ordered log of queue messages
//! between the collector and the applier, with consumer-group delivery so
//! a crashed applier's unacked entries are reclaimable by another.
//!
//! [`StreamQueue`] is the backend-agnostic contract; [`InMemoryStreamQueue`]
//! backs development and tests, [`RedisStreamQueue`] backs a real deployment.

mod memory;
mod queue_trait;
mod redis;
mod types;

pub use memory::InMemoryStreamQueue;
pub use queue_trait::StreamQueue;
pub use redis::RedisStreamQueue;
pub use types::{PendingEntry, StreamEntryOut, StreamId, StreamQueueError};
