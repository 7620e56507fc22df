// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `memory.rs`

#[cfg(test)]
mod tests {
    use super::super::MemoryStore;
    use crate::errors::StoreError;
    use crate::inventory_state::{DaemonFetchResult, InventoryStatus, ZoneInventoryState};
    use crate::store::ZoneStore;
    use crate::test_utils::extended_zone;
    use crate::zone::AppType;

    fn store_with_daemons() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let bind = store.add_app(AppType::Bind9, "agent-1:8080").unwrap();
        let pdns = store.add_app(AppType::PowerDns, "agent-2:8080").unwrap();
        let named = store.add_daemon(bind, "named").unwrap();
        let pdns_server = store.add_daemon(pdns, "pdns").unwrap();
        (store, named.id, pdns_server.id)
    }

    #[tokio::test]
    async fn test_list_dns_daemons_skips_kea() {
        let (store, named, pdns) = store_with_daemons();
        let kea = store.add_app(AppType::Kea, "agent-3:8080").unwrap();
        store.add_daemon(kea, "dhcp4").unwrap();

        let daemons = store.list_dns_daemons().await.unwrap();
        let ids: Vec<i64> = daemons.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![named, pdns]);
        assert_eq!(daemons[0].agent_address, "agent-1:8080");
        assert_eq!(daemons[1].app_type, AppType::PowerDns);
    }

    #[tokio::test]
    async fn test_add_daemon_requires_app() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.add_daemon(99, "named"),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_zone_gets_one_global_row() {
        let (store, named, pdns) = store_with_daemons();
        store
            .commit_zone_batch(named, 1, &[extended_zone(named, "example.com", "_default", 1)])
            .await
            .unwrap();
        store
            .commit_zone_batch(pdns, 1, &[extended_zone(pdns, "EXAMPLE.com.", "_default", 2)])
            .await
            .unwrap();

        assert_eq!(store.count_zones().await.unwrap(), 1);
        assert_eq!(store.count_local_zones().await.unwrap(), 2);

        let locals = store.list_local_zones("example.com").await.unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[0].zone_id, locals[1].zone_id);
        assert_eq!(locals[0].zone_name, "example.com");
    }

    #[tokio::test]
    async fn test_upsert_updates_serial() {
        let (store, named, _) = store_with_daemons();
        store
            .commit_zone_batch(named, 1, &[extended_zone(named, "example.com", "_default", 1)])
            .await
            .unwrap();
        store
            .commit_zone_batch(named, 2, &[extended_zone(named, "example.com", "_default", 5)])
            .await
            .unwrap();

        let locals = store.list_local_zones("example.com").await.unwrap();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].serial, 5);
        assert_eq!(locals[0].fetch_id, 2);
    }

    #[tokio::test]
    async fn test_commit_unknown_daemon_fails() {
        let store = MemoryStore::new();
        let result = store
            .commit_zone_batch(42, 1, &[extended_zone(42, "example.com", "_default", 1)])
            .await;
        assert_eq!(result, Err(StoreError::DaemonNotFound(42)));
        assert_eq!(store.count_zones().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let (store, named, _) = store_with_daemons();
        store
            .inject_commit_failures([StoreError::Conflict("deadlock".to_string())])
            .unwrap();
        let zones = [extended_zone(named, "example.com", "_default", 1)];

        let first = store.commit_zone_batch(named, 1, &zones).await;
        assert!(matches!(first, Err(StoreError::Conflict(_))));
        assert_eq!(store.count_zones().await.unwrap(), 0, "failed batch wrote nothing");

        store.commit_zone_batch(named, 1, &zones).await.unwrap();
        assert_eq!(store.count_zones().await.unwrap(), 1);
        assert_eq!(store.committed_batches().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_rows_and_orphans() {
        let (store, named, pdns) = store_with_daemons();
        store
            .commit_zone_batch(
                named,
                1,
                &[
                    extended_zone(named, "example.com", "_default", 1),
                    extended_zone(named, "gone.example", "_default", 1),
                ],
            )
            .await
            .unwrap();
        store
            .commit_zone_batch(pdns, 1, &[extended_zone(pdns, "example.com", "_default", 1)])
            .await
            .unwrap();
        store
            .commit_zone_batch(named, 2, &[extended_zone(named, "example.com", "_default", 2)])
            .await
            .unwrap();

        let removed = store.sweep_stale_local_zones(named, 2).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_zones().await.unwrap(), 1);
        assert!(store.list_local_zones("gone.example").await.unwrap().is_empty());
        // The other daemon's association is untouched.
        assert_eq!(store.list_local_zones("example.com").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_daemon_zones_includes_views() {
        let (store, named, pdns) = store_with_daemons();
        store
            .commit_zone_batch(
                named,
                1,
                &[
                    extended_zone(named, "example.com", "foo", 1),
                    extended_zone(named, "example.com", "bar", 1),
                ],
            )
            .await
            .unwrap();
        store
            .commit_zone_batch(pdns, 1, &[extended_zone(pdns, "example.org", "_default", 1)])
            .await
            .unwrap();

        let zones = store.list_daemon_zones(named).await.unwrap();
        let mut views: Vec<&str> = zones.iter().map(|z| z.view_name()).collect();
        views.sort_unstable();
        assert_eq!(views, vec!["bar", "foo"]);
        assert!(zones.iter().all(|z| z.name == "example.com"));
    }

    #[tokio::test]
    async fn test_inventory_state_upsert_replaces() {
        let (store, named, _) = store_with_daemons();
        store
            .upsert_inventory_state(&ZoneInventoryState::new(
                named,
                DaemonFetchResult::erred("boom"),
            ))
            .await
            .unwrap();
        store
            .upsert_inventory_state(&ZoneInventoryState::new(named, DaemonFetchResult::ok(3)))
            .await
            .unwrap();

        let states = store.list_inventory_states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status(), InventoryStatus::Ok);
        assert_eq!(states[0].result.zone_count, Some(3));
    }
}
