use std::time::Duration;

use futures::StreamExt;

use mercado_client::local::{LocalPersistence, MemoryKv};
use mercado_client::{MemoryBackend, StoreEvent, StoreOptions, SyncOutcome};
use mercado_common::catalog::{default_products, default_zones};
use mercado_common::user::{User, UserRole};
use mercado_store_integration::{local, product_row, profile, zone_row, Harness};

#[tokio::test]
async fn empty_remote_keeps_bundled_catalog() {
    local(async {
        let mut h = Harness::online(MemoryBackend::new());
        assert_eq!(h.startup().await, SyncOutcome::Connected);
        assert!(h.store.is_remote_connected());
        assert!(!h.store.is_loading());
        assert_eq!(h.store.products().len(), default_products().len());
        assert_eq!(h.store.delivery_zones().len(), default_zones().len());
        assert!(h.store.orders().is_empty());
    })
    .await;
}

#[tokio::test]
async fn remote_catalog_replaces_bundled_one() {
    local(async {
        let backend = MemoryBackend::new()
            .with_products(vec![product_row("Arroz", 250.0, 10), product_row("Aceite", 900.0, 3)])
            .with_zones(vec![zone_row("z-a", "Centro", 100.0)]);
        let mut h = Harness::online(backend);
        assert_eq!(h.startup().await, SyncOutcome::Connected);
        let names: Vec<&str> = h.store.products().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Arroz", "Aceite"]);
        assert_eq!(h.store.delivery_zones().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn offline_mode_never_touches_a_backend() {
    local(async {
        let mut h = Harness::offline();
        assert_eq!(h.startup().await, SyncOutcome::Offline);
        assert!(!h.store.is_remote_connected());
        assert_eq!(h.store.products().len(), default_products().len());

        let product = h.store.products()[0].clone();
        assert!(h.store.add_to_cart(&product));
        h.store.logout();
        h.flush().await;
    })
    .await;
}

#[tokio::test]
async fn unreachable_backend_degrades_to_offline() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        backend.set_reachable(false);
        let mut h = Harness::online(backend);
        assert!(matches!(h.startup().await, SyncOutcome::Unreachable(_)));
        assert!(!h.store.is_remote_connected());
        assert!(!h.store.is_loading());
        assert_eq!(h.store.products().len(), default_products().len());
        assert_eq!(h.backend().calls(), vec!["test_connection"]);
    })
    .await;
}

#[tokio::test]
async fn stalled_probe_is_bounded() {
    local(async {
        let backend = MemoryBackend::new();
        backend.stall("test_connection");
        let mut h = Harness::online(backend);
        let outcome = tokio::time::timeout(Duration::from_secs(5), h.startup())
            .await
            .expect("startup must not hang");
        assert!(matches!(outcome, SyncOutcome::Unreachable(_)));
        assert!(!h.store.is_loading());
    })
    .await;
}

#[tokio::test]
async fn remote_session_wins_over_restored_one() {
    local(async {
        let mut persisted = LocalPersistence::new(MemoryKv::new());
        persisted
            .save_session(&User::new_session("Local Ana", "5350000000", UserRole::Client))
            .unwrap();
        let admin = profile("Remote Admin", UserRole::Admin);
        let backend = MemoryBackend::new()
            .with_account("admin@mercadocuba.cu", "secreto1", admin.clone())
            .signed_in_as("admin@mercadocuba.cu");

        let mut h = Harness::build(StoreOptions::default(), persisted, Some(backend));
        assert_eq!(h.store.user().map(|u| u.name.as_str()), Some("Local Ana"));
        h.startup().await;
        let user = h.store.user().unwrap();
        assert_eq!(user.id, admin.id);
        assert!(h.store.is_admin());
    })
    .await;
}

#[tokio::test]
async fn restored_session_survives_without_remote_session() {
    local(async {
        let mut persisted = LocalPersistence::new(MemoryKv::new());
        persisted
            .save_session(&User::new_session("Ana", "5350000000", UserRole::Client))
            .unwrap();
        let mut h = Harness::build(StoreOptions::default(), persisted, Some(MemoryBackend::new()));
        h.startup().await;
        assert_eq!(h.store.user().map(|u| u.name.as_str()), Some("Ana"));
    })
    .await;
}

#[tokio::test]
async fn external_changes_are_pulled_in() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        let mut h = Harness::online(backend);
        h.startup().await;
        assert_eq!(h.store.products().len(), 1);

        let Harness {
            store,
            events,
            sync,
            backend,
            ..
        } = &mut h;
        let backend = backend.as_deref().unwrap();
        let drive = async {
            while backend.subscriber_count() < 2 {
                tokio::task::yield_now().await;
            }
            backend.insert_product_externally(product_row("Cristal", 300.0, 24));
            while let Some(event) = events.next().await {
                let pulled = matches!(event, StoreEvent::ProductsPulled { .. });
                store.apply(event);
                if pulled {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::select! {
                _ = sync.follow_changes() => panic!("feeds ended early"),
                _ = drive => {}
            }
        })
        .await
        .expect("change was not pulled");

        let names: Vec<&str> = h.store.products().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Cristal", "Arroz"]);
    })
    .await;
}
