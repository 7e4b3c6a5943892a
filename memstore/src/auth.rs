use std::{collections::HashMap, sync::Arc};

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use store_api::{
    AuthProvider, AuthStateStream, AuthUser, FederatedProvider, StoreError, StoreResult,
};
use tracing::info;
use uuid::Uuid;

use crate::events::EventBus;

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user: AuthUser,
    password_hash: Option<String>,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    by_email: HashMap<String, String>,
    federated: HashMap<FederatedProvider, AuthUser>,
    current: Option<AuthUser>,
    bus: EventBus<Option<AuthUser>>,
}

impl AuthState {
    fn set_current(&mut self, user: Option<AuthUser>) {
        if self.current == user {
            return;
        }
        self.current = user.clone();
        self.bus.publish(user);
    }

    fn insert(&mut self, user: AuthUser, password_hash: Option<String>) {
        if let Some(email) = &user.email {
            self.by_email.insert(email.to_ascii_lowercase(), user.uid.clone());
        }
        self.accounts.insert(
            user.uid.clone(),
            Account {
                user,
                password_hash,
            },
        );
    }
}

/// Hash a password using argon2id.
pub fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::Auth(e.to_string()))
}

/// Verify a password against an encoded hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Authentication provider holding accounts in memory. Federated sign-in
/// succeeds for providers registered with
/// [`MemoryAuth::register_federated_identity`].
#[derive(Clone, Default)]
pub struct MemoryAuth {
    state: Arc<Mutex<AuthState>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity returned the next time `provider` is used to sign in.
    pub fn register_federated_identity(&self, provider: FederatedProvider, user: AuthUser) {
        self.state.lock().federated.insert(provider, user);
    }
}

impl AuthProvider for MemoryAuth {
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, StoreResult<AuthUser>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let account = state
                .by_email
                .get(&email.trim().to_ascii_lowercase())
                .and_then(|uid| state.accounts.get(uid))
                .ok_or_else(|| StoreError::Auth("invalid-credential".into()))?;
            let valid = account
                .password_hash
                .as_deref()
                .map(|hash| verify_password(password, hash))
                .unwrap_or(false);
            if !valid {
                return Err(StoreError::Auth("invalid-credential".into()));
            }
            let user = account.user.clone();
            state.set_current(Some(user.clone()));
            info!(uid = %user.uid, "signed in with password");
            Ok(user)
        })
    }

    fn sign_in_with_provider(
        &self,
        provider: FederatedProvider,
    ) -> BoxFuture<'_, StoreResult<AuthUser>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let identity = state
                .federated
                .get(&provider)
                .cloned()
                .ok_or_else(|| StoreError::Auth("provider-not-configured".into()))?;
            let user = match state.accounts.get(&identity.uid) {
                Some(account) => account.user.clone(),
                None => {
                    state.insert(identity.clone(), None);
                    identity
                }
            };
            state.set_current(Some(user.clone()));
            info!(uid = %user.uid, ?provider, "signed in with provider");
            Ok(user)
        })
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, StoreResult<AuthUser>> {
        Box::pin(async move {
            let email = email.trim();
            if email.is_empty() || !email.contains('@') {
                return Err(StoreError::Auth("invalid-email".into()));
            }
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(StoreError::Auth("weak-password".into()));
            }
            let hash = hash_password(password)?;
            let mut state = self.state.lock();
            if state.by_email.contains_key(&email.to_ascii_lowercase()) {
                return Err(StoreError::Auth("email-already-in-use".into()));
            }
            let user = AuthUser {
                uid: Uuid::new_v4().simple().to_string(),
                email: Some(email.to_string()),
                display_name: None,
            };
            state.insert(user.clone(), Some(hash));
            state.set_current(Some(user.clone()));
            info!(uid = %user.uid, "account created");
            Ok(user)
        })
    }

    fn update_profile<'a>(&'a self, display_name: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let uid = state
                .current
                .as_ref()
                .map(|u| u.uid.clone())
                .ok_or_else(|| StoreError::Auth("no-current-user".into()))?;
            if let Some(account) = state.accounts.get_mut(&uid) {
                account.user.display_name = Some(display_name.to_string());
            }
            if let Some(current) = state.current.as_mut() {
                current.display_name = Some(display_name.to_string());
            }
            Ok(())
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.state.lock().set_current(None);
            Ok(())
        })
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.lock().current.clone()
    }

    fn on_auth_state_changed(&self) -> AuthStateStream {
        let mut state = self.state.lock();
        let current = state.current.clone();
        state.bus.subscribe_with(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("secret").unwrap();
        assert!(verify_password("secret", &hash));
        assert!(!verify_password("bad", &hash));
        assert!(!verify_password("secret", "not-a-hash"));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = MemoryAuth::new();
        let created = auth.sign_up("ann@example.org", "hunter22").await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());
        let user = auth
            .sign_in_with_password("Ann@Example.org", "hunter22")
            .await
            .unwrap();
        assert_eq!(user.uid, created.uid);
        assert!(auth
            .sign_in_with_password("ann@example.org", "wrong")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn sign_up_rules() {
        let auth = MemoryAuth::new();
        assert_eq!(
            auth.sign_up("ann@example.org", "short").await,
            Err(StoreError::Auth("weak-password".into()))
        );
        assert_eq!(
            auth.sign_up("not-an-email", "longenough").await,
            Err(StoreError::Auth("invalid-email".into()))
        );
        auth.sign_up("ann@example.org", "longenough").await.unwrap();
        assert_eq!(
            auth.sign_up("ANN@example.org", "longenough").await,
            Err(StoreError::Auth("email-already-in-use".into()))
        );
    }

    #[tokio::test]
    async fn state_stream_starts_with_current_user() {
        let auth = MemoryAuth::new();
        let mut stream = auth.on_auth_state_changed();
        assert_eq!(stream.try_recv().unwrap(), None);
        let user = auth.sign_up("bo@example.org", "longenough").await.unwrap();
        assert_eq!(stream.try_recv().unwrap(), Some(user.clone()));
        auth.update_profile("Bo").await.unwrap();
        assert_eq!(
            auth.current_user().unwrap().display_name.as_deref(),
            Some("Bo")
        );
        auth.sign_out().await.unwrap();
        assert_eq!(stream.try_recv().unwrap(), None);
        // signing out twice does not publish again
        auth.sign_out().await.unwrap();
        assert!(stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn federated_sign_in() {
        let auth = MemoryAuth::new();
        assert!(auth
            .sign_in_with_provider(FederatedProvider::GitHub)
            .await
            .is_err());
        let identity = AuthUser {
            uid: "gh-42".into(),
            email: Some("octo@example.org".into()),
            display_name: Some("Octo".into()),
        };
        auth.register_federated_identity(FederatedProvider::GitHub, identity.clone());
        let user = auth
            .sign_in_with_provider(FederatedProvider::GitHub)
            .await
            .unwrap();
        assert_eq!(user, identity);
        assert_eq!(auth.current_user(), Some(identity));
    }
}
