// SPDX-License-Identifier: MIT OR Apache-2.0
//! Redis Streams-backed [`StreamQueue`] (§4.6, §6 "Stub queue backend").
//!
//! Speaks the same hand-rolled RESP client `mm-fingerprint` already built
//! for the dedup index ([`mm_fingerprint::RespClient`]) rather than a
//! second copy of the same wire plumbing — `XADD`/`XREADGROUP`/`XACK`/
//! `XPENDING`/`XCLAIM`/`XTRIM`/`XGROUP CREATE` are just more RESP commands
//! over the same connection shape.

use crate::queue_trait::StreamQueue;
use crate::types::{PendingEntry, StreamEntryOut, StreamId, StreamQueueError};
use async_trait::async_trait;
use mm_fingerprint::{RespClient, RespValue};

/// The field name a payload is stored under within each stream entry.
///
/// Redis stream entries are field-value maps, not a single blob; mockmesh
/// only ever needs one field per entry, so a fixed name keeps the encoding
/// trivial on both ends.
const PAYLOAD_FIELD: &[u8] = b"payload";

impl From<mm_fingerprint::RespError> for StreamQueueError {
    fn from(err: mm_fingerprint::RespError) -> Self {
        StreamQueueError::Io(err.to_string())
    }
}

/// A [`StreamQueue`] backed by Redis (or a Redis-streams-compatible store).
pub struct RedisStreamQueue {
    client: RespClient,
}

impl RedisStreamQueue {
    /// Builds a queue against a Redis-compatible `host:port`.
    pub fn new(addr: impl Into<String>, password: Option<String>, db: u32) -> Self {
        Self {
            client: RespClient::new(addr, password, db),
        }
    }
}

fn as_bulk_string(value: &RespValue) -> Option<String> {
    value.as_bulk().map(|b| String::from_utf8_lossy(b).into_owned())
}

fn as_integer(value: &RespValue) -> Option<i64> {
    match value {
        RespValue::Integer(n) => Some(*n),
        _ => None,
    }
}

fn as_array(value: &RespValue) -> Option<&Vec<RespValue>> {
    match value {
        RespValue::Array(Some(items)) => Some(items),
        _ => None,
    }
}

/// Extracts `[[id, [field, value, ...]], ...]` rows (the shape `XRANGE`,
/// `XREADGROUP`'s per-stream entry list, and `XCLAIM` all share) into
/// `(id, payload_bytes)` pairs.
fn parse_stream_entries(entries: &RespValue) -> Vec<StreamEntryOut> {
    let mut out = Vec::new();
    let Some(rows) = as_array(entries) else {
        return out;
    };
    for row in rows {
        let Some(row) = as_array(row) else { continue };
        let (Some(id_value), Some(fields_value)) = (row.first(), row.get(1)) else {
            continue;
        };
        let Some(id) = as_bulk_string(id_value) else { continue };
        let Some(fields) = as_array(fields_value) else { continue };
        let mut payload = Vec::new();
        let mut i = 0;
        while i + 1 < fields.len() {
            if fields[i].as_bulk() == Some(PAYLOAD_FIELD) {
                payload = fields[i + 1].as_bulk().map(|b| b.to_vec()).unwrap_or_default();
            }
            i += 2;
        }
        out.push((id, payload));
    }
    out
}

#[async_trait]
impl StreamQueue for RedisStreamQueue {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamQueueError> {
        match self
            .client
            .call(&[b"XGROUP", b"CREATE", stream.as_bytes(), group.as_bytes(), b"0", b"MKSTREAM"])
            .await
        {
            Ok(_) => Ok(()),
            Err(mm_fingerprint::RespError::Server(msg)) if msg.contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<StreamId, StreamQueueError> {
        let reply = self
            .client
            .call(&[b"XADD", stream.as_bytes(), b"*", PAYLOAD_FIELD, &payload])
            .await?;
        as_bulk_string(&reply).ok_or_else(|| StreamQueueError::Protocol("XADD did not return an id".to_string()))
    }

    async fn read_as(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError> {
        let count_s = count.to_string();
        let block_s = block_ms.to_string();
        let reply = self
            .client
            .call(&[
                b"XREADGROUP",
                b"GROUP",
                group.as_bytes(),
                consumer.as_bytes(),
                b"COUNT",
                count_s.as_bytes(),
                b"BLOCK",
                block_s.as_bytes(),
                b"STREAMS",
                stream.as_bytes(),
                b">",
            ])
            .await?;
        // A blocked read that times out with nothing new returns a nil array.
        let Some(streams) = as_array(&reply) else {
            return Ok(Vec::new());
        };
        let Some(first_stream) = streams.first().and_then(as_array) else {
            return Ok(Vec::new());
        };
        let Some(entries) = first_stream.get(1) else {
            return Ok(Vec::new());
        };
        Ok(parse_stream_entries(entries))
    }

    async fn ack(&self, stream: &str, group: &str, id: &StreamId) -> Result<(), StreamQueueError> {
        self.client
            .call(&[b"XACK", stream.as_bytes(), group.as_bytes(), id.as_bytes()])
            .await?;
        Ok(())
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StreamQueueError> {
        let reply = self
            .client
            .call(&[b"XPENDING", stream.as_bytes(), group.as_bytes(), b"-", b"+", b"100"])
            .await?;
        let Some(rows) = as_array(&reply) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for row in rows {
            let Some(row) = as_array(row) else { continue };
            let (Some(id), Some(owner), Some(idle), Some(delivery_count)) = (
                row.first().and_then(as_bulk_string),
                row.get(1).and_then(as_bulk_string),
                row.get(2).and_then(as_integer),
                row.get(3).and_then(as_integer),
            ) else {
                continue;
            };
            out.push(PendingEntry {
                stream_id: id,
                owner,
                idle_ms: idle.max(0) as u64,
                delivery_count: delivery_count.max(0) as u32,
            });
        }
        Ok(out)
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle_ms: u64,
        ids: &[StreamId],
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let min_idle_s = min_idle_ms.to_string();
        let mut args: Vec<&[u8]> = vec![
            b"XCLAIM",
            stream.as_bytes(),
            group.as_bytes(),
            new_consumer.as_bytes(),
            min_idle_s.as_bytes(),
        ];
        let id_bytes: Vec<&[u8]> = ids.iter().map(|id| id.as_bytes()).collect();
        args.extend(id_bytes);
        let reply = self.client.call(&args).await?;
        Ok(parse_stream_entries(&reply))
    }

    async fn trim(&self, stream: &str, min_id: &StreamId) -> Result<u64, StreamQueueError> {
        let reply = self
            .client
            .call(&[b"XTRIM", stream.as_bytes(), b"MINID", min_id.as_bytes()])
            .await?;
        Ok(as_integer(&reply).unwrap_or(0).max(0) as u64)
    }
}
