use std::future::Future;
use std::sync::Arc;

use store_api::{AuthProvider, AuthStateStream, AuthUser, DocumentStore, FederatedProvider};
use tracing::{debug, info, warn};

use crate::account::{Accounts, Registration};
use crate::error::ChatResult;
use crate::projector::Projector;
use crate::session::{Session, SessionEvent, SessionSettings};

/// Something the app reacts to.
#[derive(Debug)]
pub enum AppEvent {
    Auth(Option<AuthUser>),
    Session(SessionEvent),
}

/// Ties the auth state to the session: a signed-in user gets a session, a
/// sign-out ends it. All handlers run one at a time on the caller's task.
pub struct ChatApp<P: Projector> {
    accounts: Accounts,
    session: Session<P>,
    auth_events: AuthStateStream,
}

impl<P: Projector> ChatApp<P> {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        settings: SessionSettings,
        min_password_len: usize,
        projector: P,
    ) -> Self {
        let auth_events = auth.on_auth_state_changed();
        Self {
            accounts: Accounts::new(auth, store.clone(), min_password_len),
            session: Session::new(store, settings, projector),
            auth_events,
        }
    }

    /// React to one auth-state notification.
    pub async fn handle_auth(&mut self, user: Option<AuthUser>) {
        match user {
            Some(user) => {
                if self.session.user().map(|u| u.uid.as_str()) == Some(user.uid.as_str()) {
                    debug!(uid = %user.uid, "session already running");
                    return;
                }
                self.session.projector_mut().signed_in(&user);
                if let Some(profile) = self.accounts.load_profile(&user.uid).await {
                    self.session.projector_mut().profile_loaded(&profile);
                }
                let result = self.session.start(user);
                let _ = self.report(result);
            }
            None => {
                if self.session.is_active() {
                    self.session.end();
                    self.session.projector_mut().signed_out();
                }
            }
        }
    }

    /// Apply everything already buffered: auth changes first, then session
    /// batches. Returns the number of session batches applied.
    pub async fn pump(&mut self) -> usize {
        while let Ok(user) = self.auth_events.try_recv() {
            self.handle_auth(user).await;
        }
        self.session.pump()
    }

    /// Wait for the next auth change or session batch without applying it.
    /// `None` once the auth stream has closed. Safe to use as a
    /// `tokio::select!` branch.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        tokio::select! {
            user = self.auth_events.recv() => user.map(AppEvent::Auth),
            Some(event) = self.session.next_event() => Some(AppEvent::Session(event)),
        }
    }

    pub async fn dispatch(&mut self, event: AppEvent) {
        match event {
            AppEvent::Auth(user) => self.handle_auth(user).await,
            AppEvent::Session(event) => self.session.handle(event),
        }
    }

    /// Process events until `shutdown` resolves or the auth stream closes.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = self.next_event() => event,
            };
            match event {
                Some(event) => self.dispatch(event).await,
                None => {
                    warn!("auth state stream closed");
                    break;
                }
            }
        }
    }

    pub async fn register(&mut self, form: &Registration) -> ChatResult<AuthUser> {
        let result = self.accounts.register(form).await;
        self.report(result)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> ChatResult<AuthUser> {
        let result = self.accounts.login(email, password).await;
        self.report(result)
    }

    pub async fn login_with_provider(
        &mut self,
        provider: FederatedProvider,
    ) -> ChatResult<AuthUser> {
        let result = self.accounts.login_with_provider(provider).await;
        self.report(result)
    }

    /// Best effort: mark the user offline, end the session, sign out. A
    /// failing step is logged and the next one still runs.
    pub async fn logout(&mut self) {
        let uid = self.session.user().map(|u| u.uid.clone());
        if let Some(uid) = &uid {
            if let Err(e) = self.accounts.mark_offline(uid).await {
                warn!(uid = %uid, error = %e, "failed to mark user offline");
            }
        }
        let was_active = self.session.is_active();
        self.session.end();
        if let Err(e) = self.accounts.sign_out().await {
            warn!(error = %e, "sign out failed");
        }
        if was_active {
            self.session.projector_mut().signed_out();
        }
        info!("logged out");
    }

    pub async fn open_chat(&mut self, friend_id: &str) -> ChatResult<()> {
        let result = self.session.open_chat(friend_id).await;
        self.report(result)
    }

    pub async fn send_message(&mut self, text: &str) -> ChatResult<String> {
        let result = self.session.send_message(text).await;
        self.report(result)
    }

    pub fn close_chat(&mut self) {
        self.session.close_chat();
    }

    pub async fn request_friend(&mut self, email: &str) -> ChatResult<String> {
        let result = self.session.request_friend(email).await;
        self.report(result)
    }

    pub async fn accept_request(&mut self, friendship_id: &str) -> ChatResult<()> {
        let result = self.session.accept_request(friendship_id).await;
        self.report(result)
    }

    fn report<T>(&mut self, result: ChatResult<T>) -> ChatResult<T> {
        if let Err(e) = &result {
            self.session
                .projector_mut()
                .notify(e.title(), &e.to_string());
        }
        result
    }

    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<P> {
        &mut self.session
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn projector(&self) -> &P {
        self.session.projector()
    }
}
