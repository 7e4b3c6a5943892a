use std::sync::Arc;
use std::time::Duration;

use chat_client::account::Registration;
use chat_client::model::{FromDocument, LastSeen, Presence, User, USERS};
use chat_client::projector::{Projection, RecordingProjector};
use chat_client::{ChatApp, ChatError, SessionSettings};
use memstore::{MemoryAuth, MemoryStore};
use store_api::{AuthProvider, AuthUser, DocumentStore, FederatedProvider, StoreError};

fn app(auth: &MemoryAuth, store: &MemoryStore) -> ChatApp<RecordingProjector> {
    ChatApp::new(
        Arc::new(auth.clone()),
        Arc::new(store.clone()),
        SessionSettings::default(),
        6,
        RecordingProjector::default(),
    )
}

fn form(name: &str, email: &str, password: &str, confirm: &str) -> Registration {
    Registration {
        display_name: name.into(),
        email: email.into(),
        password: password.into(),
        confirm_password: confirm.into(),
    }
}

async fn profile(store: &MemoryStore, uid: &str) -> User {
    let doc = store.get(USERS, uid).await.unwrap().unwrap();
    User::from_document(&doc).unwrap()
}

#[tokio::test]
async fn registration_starts_a_session() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);

    let user = app
        .register(&form("Ann", "ann@example.org", "secret1", "secret1"))
        .await
        .unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Ann"));
    assert_eq!(
        auth.current_user().and_then(|u| u.display_name),
        Some("Ann".into())
    );

    let stored = profile(&store, &user.uid).await;
    assert_eq!(stored.display_name, "Ann");
    assert_eq!(stored.email, "ann@example.org");
    assert_eq!(stored.status, Presence::Online);
    assert!(matches!(stored.last_seen, Some(LastSeen::Text(_))));
    assert!(stored.created_at.is_some());

    app.pump().await;
    assert_eq!(app.session().user().map(|u| u.uid.as_str()), Some(user.uid.as_str()));
    let calls = &app.projector().calls;
    assert!(calls.contains(&Projection::SignedIn(user.uid.clone())));
    assert!(calls.contains(&Projection::NoFriends));
    assert!(calls
        .iter()
        .any(|c| matches!(c, Projection::Profile(p) if p.display_name == "Ann")));
}

#[tokio::test]
async fn invalid_registration_writes_nothing() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);

    for bad in [
        form("Ann", "ann@example.org", "secret1", "secret2"),
        form("Ann", "ann@example.org", "abc", "abc"),
        form("", "ann@example.org", "secret1", "secret1"),
    ] {
        let err = app.register(&bad).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)), "{bad:?}");
    }
    assert_eq!(store.write_count(), 0);
    assert!(auth.current_user().is_none());
    let notices = app
        .projector()
        .calls
        .iter()
        .filter(|c| matches!(c, Projection::Notice { .. }))
        .count();
    assert_eq!(notices, 3);
}

#[tokio::test]
async fn logout_marks_offline_and_clears_session() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);
    let user = app
        .register(&form("Ann", "ann@example.org", "secret1", "secret1"))
        .await
        .unwrap();
    app.pump().await;
    assert!(app.session().is_active());

    app.logout().await;
    assert!(!app.session().is_active());
    assert_eq!(app.session().active_subscriptions(), 0);
    assert!(auth.current_user().is_none());

    let stored = profile(&store, &user.uid).await;
    assert_eq!(stored.status, Presence::Offline);
    assert!(matches!(stored.last_seen, Some(LastSeen::Millis(_))));

    // the sign-out notification arrives after the session is already gone
    app.pump().await;
    let signed_out = app
        .projector()
        .calls
        .iter()
        .filter(|c| **c == Projection::SignedOut)
        .count();
    assert_eq!(signed_out, 1);
}

#[tokio::test]
async fn logout_survives_backend_failures() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);
    app.register(&form("Ann", "ann@example.org", "secret1", "secret1"))
        .await
        .unwrap();
    app.pump().await;

    store.fail_writes(Some(StoreError::Unavailable("offline".into())));
    store.fail_unsubscribe(Some(StoreError::Unavailable("offline".into())));
    app.logout().await;
    assert!(!app.session().is_active());
    assert!(app.session().friends().is_empty());
    assert!(auth.current_user().is_none());
}

#[tokio::test]
async fn password_login_after_logout() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);
    let user = app
        .register(&form("Ann", "ann@example.org", "secret1", "secret1"))
        .await
        .unwrap();
    app.pump().await;
    app.logout().await;
    app.pump().await;

    let err = app.login("ann@example.org", "wrong-pass").await.unwrap_err();
    assert!(matches!(err, ChatError::Backend(StoreError::Auth(_))));
    assert!(matches!(
        app.login("", "").await,
        Err(ChatError::Validation(_))
    ));

    app.login("ann@example.org", "secret1").await.unwrap();
    app.pump().await;
    assert_eq!(app.session().user().map(|u| u.uid.as_str()), Some(user.uid.as_str()));
}

#[tokio::test]
async fn provider_login_uses_registered_identity() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);

    let err = app
        .login_with_provider(FederatedProvider::GitHub)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Backend(StoreError::Auth(_))));

    auth.register_federated_identity(
        FederatedProvider::Google,
        AuthUser {
            uid: "g-42".into(),
            email: Some("g@example.org".into()),
            display_name: Some("Gee".into()),
        },
    );
    app.login_with_provider(FederatedProvider::Google)
        .await
        .unwrap();
    app.pump().await;
    assert_eq!(app.session().user().map(|u| u.uid.as_str()), Some("g-42"));
}

#[tokio::test]
async fn run_until_follows_auth_changes() {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let mut app = app(&auth, &store);
    let signer = auth.clone();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let driver = app.run_until(async {
        let _ = stop_rx.await;
    });
    let script = async move {
        signer.sign_up("bea@example.org", "secret1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = stop_tx.send(());
    };
    tokio::join!(driver, script);

    assert!(app.session().is_active());
    assert!(app
        .projector()
        .calls
        .contains(&Projection::NoFriends));
}
