use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::StoreResult;

/// Identity of a signed-in account as seen by the auth provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Third-party identity providers offered at sign-in.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
    GitHub,
}

/// Receives the current user (or `None`) on subscription and after every change.
pub type AuthStateStream = UnboundedReceiver<Option<AuthUser>>;

pub trait AuthProvider: Send + Sync {
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, StoreResult<AuthUser>>;

    fn sign_in_with_provider(
        &self,
        provider: FederatedProvider,
    ) -> BoxFuture<'_, StoreResult<AuthUser>>;

    /// Create a password account. The new account becomes the signed-in user.
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, StoreResult<AuthUser>>;

    /// Set the display name of the signed-in user.
    fn update_profile<'a>(&'a self, display_name: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    fn sign_out(&self) -> BoxFuture<'_, StoreResult<()>>;

    fn current_user(&self) -> Option<AuthUser>;

    fn on_auth_state_changed(&self) -> AuthStateStream;
}
