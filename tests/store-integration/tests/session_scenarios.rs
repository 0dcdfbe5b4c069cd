use std::rc::Rc;

use mercado_client::auth::{Registration, StaffKeyGate};
use mercado_client::local::{FileKv, LocalPersistence};
use mercado_client::remote::rows::{is_remote_id, ProfilePatch};
use mercado_client::{AuthError, MemoryBackend, RemoteBackend, StoreOptions};
use mercado_common::user::UserRole;
use mercado_store_integration::{local, Harness, TIMEOUT};

fn on_disk(dir: &std::path::Path) -> LocalPersistence {
    LocalPersistence::new(FileKv::open(dir).unwrap())
}

#[tokio::test]
async fn session_persists_across_restarts() {
    local(async {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut h = Harness::build(StoreOptions::default(), on_disk(dir.path()), None);
            h.store
                .register_local_user(&Registration::client("Ana", "5351234567", "", "1234"))
                .unwrap();
        }
        let mut h = Harness::build(StoreOptions::default(), on_disk(dir.path()), None);
        assert_eq!(h.store.user().map(|u| u.name.as_str()), Some("Ana"));

        h.store.logout();
        let h = Harness::build(StoreOptions::default(), on_disk(dir.path()), None);
        assert!(h.store.user().is_none());
    })
    .await;
}

#[tokio::test]
async fn accounts_registered_remotely_sign_in_anywhere() {
    local(async {
        let backend = MemoryBackend::new();
        let mut h = Harness::online(backend);
        h.startup().await;
        let backend = h.backend.clone();
        let reg = Registration::client("Ana", "", "ana@example.com", "1234");
        h.store
            .register(backend.as_deref(), &reg, None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(h.backend().call_count("create_profile"), 1);

        // A second device with an empty local table.
        let mut other = Harness::offline();
        let user = other
            .store
            .sign_in(backend.as_deref(), "ana@example.com", "1234", false, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(user.name, "Ana");
        assert!(matches!(
            other
                .store
                .sign_in(backend.as_deref(), "nadie@example.com", "1234", false, TIMEOUT)
                .await,
            Err(AuthError::UnknownUser(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn staff_accounts_need_the_owner_key() {
    local(async {
        let backend = MemoryBackend::new().with_setting("admin_secret_key", "llave-2026");
        let mut h = Harness::online(backend);
        let backend = h.backend.clone();
        let mut gate = StaffKeyGate::new();
        let reg = Registration {
            confirm: Some("secreto1".into()),
            role: UserRole::Admin,
            ..Registration::client("Marta", "5350000001", "", "secreto1")
        };
        let err = h
            .store
            .register(backend.as_deref(), &reg, Some((&mut gate, "llave-2025")), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSecretKey { attempt: 1, .. }));
        assert!(h.store.user().is_none());

        h.store
            .register(backend.as_deref(), &reg, Some((&mut gate, "llave-2026")), TIMEOUT)
            .await
            .unwrap();
        assert!(h.store.is_admin());

        h.store.logout();
        let user = h
            .store
            .sign_in(backend.as_deref(), "5350000001", "secreto1", true, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Admin);
    })
    .await;
}

#[tokio::test]
async fn profile_edits_reach_the_backend() {
    local(async {
        let mut h = Harness::online(MemoryBackend::new());
        h.startup().await;
        let backend = h.backend.clone();
        let reg = Registration::client("Ana", "", "ana@example.com", "1234");
        h.store
            .register(backend.as_deref(), &reg, None, TIMEOUT)
            .await
            .unwrap();
        let id = h.store.user().map(|u| u.id.clone()).unwrap();

        assert!(h.store.update_profile(ProfilePatch {
            phone: Some("5359998877".into()),
            ..Default::default()
        }));
        h.flush().await;

        let profile = h.backend().get_profile(&id).await.unwrap().unwrap();
        assert_eq!(profile.phone.as_deref(), Some("5359998877"));
        assert_eq!(profile.name, "Ana");
    })
    .await;
}

#[tokio::test]
async fn remote_session_is_resumed_after_restart() {
    local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = Rc::new(MemoryBackend::new());
        let id = {
            let mut h = Harness::attach(
                StoreOptions::default(),
                on_disk(dir.path()),
                Some(Rc::clone(&backend)),
            );
            h.startup().await;
            let reg = Registration::client("Ana", "", "ana@example.com", "1234");
            let shared = Some(Rc::clone(&backend));
            h.store
                .register(shared.as_deref(), &reg, None, TIMEOUT)
                .await
                .unwrap()
                .id
                .clone()
        };
        assert!(is_remote_id(&id));
        // The next process starts without any backend session of its own.
        backend.forget_session();

        let mut h = Harness::attach(
            StoreOptions::default(),
            on_disk(dir.path()),
            Some(Rc::clone(&backend)),
        );
        h.startup().await;
        assert_eq!(backend.call_count("resume_session"), 1);
        let session = backend.get_session().await.unwrap().unwrap();
        assert_eq!(session.user_id, id);
        assert_eq!(h.store.user().map(|u| u.id.as_str()), Some(id.as_str()));

        h.store.logout();
        h.flush().await;
        let h = Harness::attach(StoreOptions::default(), on_disk(dir.path()), Some(backend));
        assert!(h.store.user().is_none());
        assert_eq!(h.backend().call_count("resume_session"), 1);
    })
    .await;
}
