// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `sqlite.rs`

#[cfg(test)]
mod tests {
    use super::super::{map_sqlx_error, SqliteStore};
    use crate::errors::StoreError;
    use crate::inventory_state::{DaemonFetchResult, InventoryStatus, ZoneInventoryState};
    use crate::store::ZoneStore;
    use crate::test_utils::extended_zone;
    use crate::zone::{AppType, Daemon};

    async fn store() -> SqliteStore {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        store
    }

    async fn daemon(store: &SqliteStore, app_type: AppType, name: &str) -> Daemon {
        let app = store.add_app(app_type, "agent-1:8080").await.unwrap();
        store.add_daemon(app, name).await.unwrap()
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let store = store().await;
        store.init_schema().await.unwrap();
        assert_eq!(store.count_zones().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_dns_daemons_filters_app_type() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        daemon(&store, AppType::Kea, "dhcp4").await;
        let pdns = daemon(&store, AppType::PowerDns, "pdns").await;

        let daemons = store.list_dns_daemons().await.unwrap();
        assert_eq!(daemons, vec![named, pdns]);
    }

    #[tokio::test]
    async fn test_add_daemon_unknown_app() {
        let store = store().await;
        assert!(matches!(
            store.add_daemon(7, "named").await,
            Err(StoreError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_shares_zone_rows_across_daemons() {
        let store = store().await;
        let first = daemon(&store, AppType::Bind9, "named").await;
        let second = daemon(&store, AppType::Bind9, "named").await;

        for d in [&first, &second] {
            let zones: Vec<_> = ["example.com", "Example.ORG.", "example.net"]
                .iter()
                .map(|name| extended_zone(d.id, name, "_default", 1))
                .collect();
            store.commit_zone_batch(d.id, 1, &zones).await.unwrap();
        }

        assert_eq!(store.count_zones().await.unwrap(), 3);
        assert_eq!(store.count_local_zones().await.unwrap(), 6);
        let locals = store.list_local_zones("example.org").await.unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[0].zone_name, "example.org");
        assert_eq!(locals[0].daemon_id, first.id);
        assert_eq!(locals[1].daemon_id, second.id);
    }

    #[tokio::test]
    async fn test_commit_multi_view() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        let zones = vec![
            extended_zone(named.id, "example.com", "foo", 1),
            extended_zone(named.id, "example.com", "bar", 2),
        ];
        store.commit_zone_batch(named.id, 1, &zones).await.unwrap();

        assert_eq!(store.count_zones().await.unwrap(), 1);
        let locals = store.list_local_zones("example.com").await.unwrap();
        let views: Vec<&str> = locals.iter().map(|l| l.view.as_str()).collect();
        assert_eq!(views, vec!["bar", "foo"]);
        assert_eq!(locals[0].serial, 2);
    }

    #[tokio::test]
    async fn test_replayed_batch_updates_in_place() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        let mut zone = extended_zone(named.id, "example.com", "_default", 1);
        store
            .commit_zone_batch(named.id, 1, std::slice::from_ref(&zone))
            .await
            .unwrap();
        zone.zone.serial = 4_000_000_000;
        zone.zone.url = Some("/api/v1/servers/localhost/zones/example.com.".to_string());
        store
            .commit_zone_batch(named.id, 2, std::slice::from_ref(&zone))
            .await
            .unwrap();

        let locals = store.list_local_zones("example.com").await.unwrap();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].serial, 4_000_000_000);
        assert_eq!(locals[0].fetch_id, 2);
        assert_eq!(locals[0].url, zone.zone.url);
        assert_eq!(locals[0].loaded_at, zone.zone.loaded_at);
    }

    #[tokio::test]
    async fn test_commit_unknown_daemon() {
        let store = store().await;
        let result = store
            .commit_zone_batch(99, 1, &[extended_zone(99, "example.com", "_default", 1)])
            .await;
        assert_eq!(result, Err(StoreError::DaemonNotFound(99)));
    }

    #[tokio::test]
    async fn test_sweep_stale_local_zones() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        let pdns = daemon(&store, AppType::PowerDns, "pdns").await;
        store
            .commit_zone_batch(
                named.id,
                1,
                &[
                    extended_zone(named.id, "keep.example", "_default", 1),
                    extended_zone(named.id, "shared.example", "_default", 1),
                    extended_zone(named.id, "gone.example", "_default", 1),
                ],
            )
            .await
            .unwrap();
        store
            .commit_zone_batch(pdns.id, 1, &[extended_zone(pdns.id, "shared.example", "_default", 1)])
            .await
            .unwrap();
        store
            .commit_zone_batch(named.id, 2, &[extended_zone(named.id, "keep.example", "_default", 2)])
            .await
            .unwrap();

        assert_eq!(store.sweep_stale_local_zones(named.id, 2).await.unwrap(), 2);
        assert_eq!(store.count_zones().await.unwrap(), 2, "shared zone survives");
        assert_eq!(store.count_local_zones().await.unwrap(), 2);
        assert!(store.list_local_zones("gone.example").await.unwrap().is_empty());

        // Nothing stale left
        assert_eq!(store.sweep_stale_local_zones(named.id, 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_daemon_zones() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        store
            .commit_zone_batch(
                named.id,
                1,
                &[
                    extended_zone(named.id, "a.example", "_default", 1),
                    extended_zone(named.id, "b.example", "_default", 1),
                ],
            )
            .await
            .unwrap();

        let mut names: Vec<String> = store
            .list_daemon_zones(named.id)
            .await
            .unwrap()
            .into_iter()
            .map(|zone| zone.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.example", "b.example"]);
        assert!(store.list_daemon_zones(named.id + 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inventory_state_round_trip() {
        let store = store().await;
        let named = daemon(&store, AppType::Bind9, "named").await;
        let busy = ZoneInventoryState::new(
            named.id,
            DaemonFetchResult::erred("Zone inventory is temporarily busy"),
        );
        store.upsert_inventory_state(&busy).await.unwrap();
        let ok = ZoneInventoryState::new(named.id, DaemonFetchResult::ok(12));
        store.upsert_inventory_state(&ok).await.unwrap();

        let states = store.list_inventory_states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].daemon_id, named.id);
        assert_eq!(states[0].result, ok.result);
        assert_eq!(states[0].status(), InventoryStatus::Ok);
    }

    #[tokio::test]
    async fn test_inventory_state_unknown_daemon() {
        let store = store().await;
        let state = ZoneInventoryState::new(5, DaemonFetchResult::ok(0));
        assert_eq!(
            store.upsert_inventory_state(&state).await,
            Err(StoreError::DaemonNotFound(5))
        );
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("inventory.db").display());

        let named_id = {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.init_schema().await.unwrap();
            let named = daemon(&store, AppType::Bind9, "named").await;
            store
                .commit_zone_batch(named.id, 1, &[extended_zone(named.id, "example.com", "_default", 1)])
                .await
                .unwrap();
            named.id
        };

        let reopened = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(reopened.count_zones().await.unwrap(), 1);
        assert_eq!(reopened.list_daemon_zones(named_id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_non_database_errors_are_not_retryable() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_retryable());
    }
}
