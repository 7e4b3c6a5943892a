use std::sync::Arc;

use serde::Serialize;
use store_api::{
    server_timestamp, to_fields, AuthProvider, AuthUser, DocumentStore, FederatedProvider, Fields,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{ChatError, ChatResult};
use crate::model::{FromDocument, Presence, User, USERS};

/// Sign-up form as entered by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Registration {
    /// Check the form before anything is sent.
    pub fn validate(&self, min_password_len: usize) -> ChatResult<()> {
        if self.display_name.trim().is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(ChatError::validation("please fill in all fields"));
        }
        if self.password != self.confirm_password {
            return Err(ChatError::validation("passwords do not match"));
        }
        if self.password.chars().count() < min_password_len {
            return Err(ChatError::validation(format!(
                "password must be at least {min_password_len} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewUser<'a> {
    uid: &'a str,
    display_name: &'a str,
    email: &'a str,
    status: Presence,
    last_seen: String,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Account operations against the auth provider and the `users` collection.
#[derive(Clone)]
pub struct Accounts {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    min_password_len: usize,
}

impl Accounts {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        min_password_len: usize,
    ) -> Self {
        Self {
            auth,
            store,
            min_password_len,
        }
    }

    /// Create the account, its profile document and its display name.
    pub async fn register(&self, form: &Registration) -> ChatResult<AuthUser> {
        form.validate(self.min_password_len)?;
        let email = form.email.trim();
        let display_name = form.display_name.trim();
        let user = self.auth.sign_up(email, &form.password).await?;
        let profile = NewUser {
            uid: &user.uid,
            display_name,
            email,
            status: Presence::Online,
            last_seen: now_rfc3339(),
        };
        let mut fields = to_fields(&profile)?;
        fields.insert("createdAt".into(), server_timestamp());
        self.store.set(USERS, &user.uid, fields).await?;
        self.auth.update_profile(display_name).await?;
        info!(uid = %user.uid, "registered");
        Ok(AuthUser {
            display_name: Some(display_name.to_string()),
            ..user
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> ChatResult<AuthUser> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ChatError::validation("please fill in all fields"));
        }
        Ok(self.auth.sign_in_with_password(email, password).await?)
    }

    pub async fn login_with_provider(&self, provider: FederatedProvider) -> ChatResult<AuthUser> {
        Ok(self.auth.sign_in_with_provider(provider).await?)
    }

    /// Mark `uid` offline with a server-assigned `lastSeen`.
    pub async fn mark_offline(&self, uid: &str) -> ChatResult<()> {
        let mut fields = Fields::new();
        fields.insert("status".into(), "offline".into());
        fields.insert("lastSeen".into(), server_timestamp());
        self.store.update(USERS, uid, fields).await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> ChatResult<()> {
        Ok(self.auth.sign_out().await?)
    }

    /// Profile document of `uid`, if one exists. Read failures are logged
    /// and treated as absent.
    pub async fn load_profile(&self, uid: &str) -> Option<User> {
        let doc = match self.store.get(USERS, uid).await {
            Ok(doc) => doc?,
            Err(e) => {
                warn!(uid, error = %e, "failed to load profile");
                return None;
            }
        };
        match User::from_document(&doc) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(uid, error = %e, "malformed profile");
                None
            }
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.auth.current_user()
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }
}
