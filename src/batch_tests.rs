// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `batch.rs`

#[cfg(test)]
mod tests {
    use super::super::{coalesce, ZoneBatch};
    use crate::errors::{BatchError, StoreError};
    use crate::store::{MemoryStore, ZoneStore};
    use crate::test_utils::extended_zone;
    use crate::zone::AppType;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let app = store.add_app(AppType::Bind9, "agent-1:8080").unwrap();
        let daemon = store.add_daemon(app, "named").unwrap();
        (store, daemon.id)
    }

    #[test]
    fn test_coalesce_keeps_last_occurrence() {
        let zones = vec![
            extended_zone(1, "example.com", "_default", 1),
            extended_zone(1, "example.org", "_default", 1),
            extended_zone(1, "EXAMPLE.com.", "_default", 2),
            extended_zone(1, "example.com", "guest", 3),
        ];
        let (kept, shadowed) = coalesce(zones);

        assert_eq!(shadowed, 1);
        let summary: Vec<(&str, &str, u32)> = kept
            .iter()
            .map(|z| (z.name(), z.view(), z.zone.serial))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("example.org", "_default", 1),
                ("EXAMPLE.com.", "_default", 2),
                ("example.com", "guest", 3),
            ]
        );
    }

    #[test]
    fn test_coalesce_without_duplicates() {
        let zones = vec![
            extended_zone(1, "a.example", "_default", 1),
            extended_zone(1, "b.example", "_default", 1),
        ];
        let (kept, shadowed) = coalesce(zones.clone());
        assert_eq!(shadowed, 0);
        assert_eq!(kept, zones);
    }

    #[tokio::test]
    async fn test_flushes_when_full() {
        let (store, daemon_id) = setup();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 3);

        for i in 0..7 {
            batch
                .add(extended_zone(daemon_id, &format!("z{i}.example"), "_default", 1), &cancel)
                .await
                .unwrap();
        }
        assert_eq!(store.committed_batches().unwrap(), 2);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.committed(), 6);

        batch.flush(&cancel).await.unwrap();
        assert_eq!(store.committed_batches().unwrap(), 3);
        assert!(batch.is_empty());
        assert_eq!(store.count_local_zones().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_empty_flush_is_a_no_op() {
        let (store, daemon_id) = setup();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        batch.flush(&CancellationToken::new()).await.unwrap();
        assert_eq!(store.committed_batches().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shadowed_zones_are_counted() {
        let (store, daemon_id) = setup();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        batch
            .add(extended_zone(daemon_id, "example.com", "_default", 1), &cancel)
            .await
            .unwrap();
        batch
            .add(extended_zone(daemon_id, "example.com", "_default", 9), &cancel)
            .await
            .unwrap();
        batch.flush(&cancel).await.unwrap();

        assert_eq!(batch.committed(), 1);
        assert_eq!(batch.shadowed(), 1);
        let locals = store.list_local_zones("example.com").await.unwrap();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].serial, 9);
    }

    #[tokio::test]
    async fn test_retries_conflicts() {
        let (store, daemon_id) = setup();
        store
            .inject_commit_failures([
                StoreError::Conflict("deadlock detected".to_string()),
                StoreError::Conflict("database is locked".to_string()),
            ])
            .unwrap();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        batch
            .add(extended_zone(daemon_id, "example.com", "_default", 1), &cancel)
            .await
            .unwrap();

        batch.flush(&cancel).await.unwrap();
        assert_eq!(store.count_zones().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let (store, daemon_id) = setup();
        store
            .inject_commit_failures(
                (0..4).map(|_| StoreError::Conflict("serialization failure".to_string())),
            )
            .unwrap();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        batch
            .add(extended_zone(daemon_id, "example.com", "_default", 1), &cancel)
            .await
            .unwrap();

        let err = batch.flush(&cancel).await.unwrap_err();
        assert!(matches!(err, BatchError::Store { attempts: 4, .. }));
        assert!(batch.is_empty(), "failed batch is dropped");
        assert_eq!(store.count_zones().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_daemon_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), 77, 1, 1);

        let err = batch
            .add(extended_zone(77, "example.com", "_default", 1), &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::Store {
                attempts: 1,
                source: StoreError::DaemonNotFound(77)
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_flush_writes_nothing() {
        let (store, daemon_id) = setup();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        batch
            .add(extended_zone(daemon_id, "example.com", "_default", 1), &cancel)
            .await
            .unwrap();

        cancel.cancel();
        assert_eq!(batch.flush(&cancel).await, Err(BatchError::Cancelled));
        assert_eq!(store.count_zones().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_discard() {
        let (store, daemon_id) = setup();
        let cancel = CancellationToken::new();
        let mut batch = ZoneBatch::new(store.clone(), daemon_id, 1, 10);
        for name in ["a.example", "b.example"] {
            batch
                .add(extended_zone(daemon_id, name, "_default", 1), &cancel)
                .await
                .unwrap();
        }

        assert_eq!(batch.discard(), 2);
        batch.flush(&cancel).await.unwrap();
        assert_eq!(store.committed_batches().unwrap(), 0);
    }
}
