// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations, kept separate from argument
//! parsing so they can be exercised without spawning the binary.

use anyhow::{Context, Result};
use mm_backup::{BackupStore, RestoredBackup};
use mm_core::{BackupRecord, Stub};
use mm_mockclient::{ApplyBatchResult, MockClient};
use std::path::Path;

/// Lists mappings registered with the mock server.
pub async fn list_mappings(client: &MockClient, limit: u32, offset: u32) -> Result<Vec<Stub>> {
    client.list_stubs(limit, offset).await.context("listing mappings")
}

/// Fetches one mapping by id.
pub async fn get_mapping(client: &MockClient, id: &str) -> Result<Stub> {
    client.get_stub(id).await.with_context(|| format!("fetching mapping {id}"))
}

/// Reads a [`Stub`] from a JSON file and registers it directly, bypassing
/// the collector entirely (the same direct-registration path the control
/// surface's `POST /mappings` exposes over HTTP).
pub async fn create_mapping(client: &MockClient, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let stub: Stub = serde_json::from_str(&content).with_context(|| format!("parsing stub from {}", file.display()))?;
    client.create_stub(&stub).await.with_context(|| format!("creating mapping {}", stub.id))
}

/// Deletes one mapping by id.
pub async fn delete_mapping(client: &MockClient, id: &str) -> Result<()> {
    client.delete_stub(id).await.with_context(|| format!("deleting mapping {id}"))
}

/// Resets every mapping on the mock server.
pub async fn reset_mappings(client: &MockClient) -> Result<()> {
    client.reset_all().await.context("resetting mappings")
}

/// Lists recently served requests, matched or not.
pub async fn recent_requests(client: &MockClient, limit: u32) -> Result<Vec<serde_json::Value>> {
    client.list_recent_requests(limit).await.context("listing recent requests")
}

/// Lists requests the mock server couldn't match to any mapping.
pub async fn unmatched_requests(client: &MockClient) -> Result<Vec<serde_json::Value>> {
    client.list_unmatched_requests().await.context("listing unmatched requests")
}

/// Lists backup records, optionally filtered to one mapping id.
pub async fn list_backups(store: &BackupStore, mapping_id: Option<&str>, days: u32) -> Result<Vec<BackupRecord>> {
    store.list_backups(mapping_id, days).await.context("listing backups")
}

/// Restores a backup file (resolved relative to the store's root) and
/// replays every stub it contains back onto the mock server.
pub async fn restore_backup(store: &BackupStore, client: &MockClient, relative_path: &str) -> Result<ApplyBatchResult> {
    let path = store.root().join(relative_path);
    let restored = store.restore(&path).await.with_context(|| format!("restoring {relative_path}"))?;
    let stubs = match restored {
        RestoredBackup::Single(stub) => vec![stub],
        RestoredBackup::Batch(stubs) => stubs,
    };
    Ok(client.apply_batch(stubs).await)
}

/// Deletes every backup older than the store's retention window.
pub async fn cleanup_backups(store: &BackupStore) -> Result<u64> {
    store.cleanup_expired().await.context("cleaning up expired backups")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_mockclient::MockClientConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_mappings_delegates_to_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__admin/mappings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        let client = MockClient::new(MockClientConfig { base_url: server.uri(), ..MockClientConfig::default() });
        let stubs = list_mappings(&client, 100, 0).await.unwrap();
        assert!(stubs.is_empty());
    }

    #[tokio::test]
    async fn create_mapping_rejects_malformed_file() {
        let server = MockServer::start().await;
        let client = MockClient::new(MockClientConfig { base_url: server.uri(), ..MockClientConfig::default() });
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stub.json");
        std::fs::write(&file, b"not json").unwrap();
        assert!(create_mapping(&client, &file).await.is_err());
    }
}
