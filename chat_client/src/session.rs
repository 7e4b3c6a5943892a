use std::sync::Arc;

use store_api::{
    AuthUser, ChangeBatch, Direction, DocumentStore, Query, Subscription, SubscriptionEvent,
    SubscriptionMode,
};
use tracing::{debug, info, warn};

use crate::chat::ChatSession;
use crate::error::{ChatError, ChatResult};
use crate::friends::{entries_from_snapshot, FriendshipIndex};
use crate::model::{Friendship, Message, MESSAGES};
use crate::projector::Projector;
use crate::recent::RecentConversations;
use crate::requests::{friends_query, incoming_query, FriendRequests};

/// Tunables for one signed-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Messages loaded when a chat is opened.
    pub history_limit: usize,
    /// Messages scanned for the recent conversation list; `None` disables it.
    pub recent_limit: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            recent_limit: Some(20),
        }
    }
}

/// A batch from one of the session's subscriptions.
#[derive(Debug)]
pub enum SessionEvent {
    Friends(SubscriptionEvent),
    Requests(SubscriptionEvent),
    Recent(SubscriptionEvent),
    Chat(SubscriptionEvent),
}

impl SessionEvent {
    fn source(&self) -> &'static str {
        match self {
            Self::Friends(_) => "friends",
            Self::Requests(_) => "requests",
            Self::Recent(_) => "recent",
            Self::Chat(_) => "chat",
        }
    }
}

struct Active {
    user: AuthUser,
    friends: Subscription,
    requests: Subscription,
    recent: Option<Subscription>,
    chat: ChatSession,
    flow: FriendRequests,
}

/// Everything tied to the signed-in user: subscriptions, caches and the open
/// chat. At most one session is active; it owns every subscription handle
/// and is the only place they are cancelled.
pub struct Session<P: Projector> {
    store: Arc<dyn DocumentStore>,
    settings: SessionSettings,
    projector: P,
    active: Option<Active>,
    friends: FriendshipIndex,
    recent: RecentConversations,
}

async fn next_if_open(sub: Option<&mut Subscription>) -> Option<SubscriptionEvent> {
    match sub {
        Some(sub) => sub.next().await,
        None => None,
    }
}

fn cancel_logged(name: &str, sub: &mut Subscription) {
    if let Err(e) = sub.cancel() {
        warn!(subscription = name, error = %e, "failed to cancel subscription");
    }
}

impl<P: Projector> Session<P> {
    pub fn new(store: Arc<dyn DocumentStore>, settings: SessionSettings, projector: P) -> Self {
        Self {
            store,
            settings,
            projector,
            active: None,
            friends: FriendshipIndex::new(),
            recent: RecentConversations::new(),
        }
    }

    /// Begin a session for `user`, ending any previous one first.
    ///
    /// If a subscription cannot be opened, the ones already opened are
    /// released and no session is active.
    pub fn start(&mut self, user: AuthUser) -> ChatResult<()> {
        self.end();
        let uid = user.uid.clone();
        let friends = self
            .store
            .subscribe(friends_query(&uid), SubscriptionMode::Snapshot)?;
        let requests = self
            .store
            .subscribe(incoming_query(&uid), SubscriptionMode::Snapshot)?;
        let recent = match self.settings.recent_limit {
            Some(limit) => {
                let query = Query::collection(MESSAGES)
                    .where_array_contains("participants", uid.as_str())
                    .order_by("timestamp", Direction::Desc)
                    .limit(limit);
                Some(self.store.subscribe(query, SubscriptionMode::Snapshot)?)
            }
            None => None,
        };
        let chat = ChatSession::new(self.store.clone(), uid.as_str(), self.settings.history_limit);
        let flow = FriendRequests::new(self.store.clone(), uid.as_str(), user.email.clone());
        self.active = Some(Active {
            user,
            friends,
            requests,
            recent,
            chat,
            flow,
        });
        info!(uid = %uid, "session started");
        Ok(())
    }

    /// Tear the session down. Cancellation failures are logged and never
    /// stop local state from being cleared. Calling it again is a no-op.
    pub fn end(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        cancel_logged("friends", &mut active.friends);
        cancel_logged("requests", &mut active.requests);
        if let Some(recent) = active.recent.as_mut() {
            cancel_logged("recent", recent);
        }
        active.chat.close();
        self.friends.clear();
        self.recent.clear();
        info!(uid = %active.user.uid, "session ended");
        self.projector.session_cleared();
    }

    fn active(&self) -> ChatResult<&Active> {
        self.active
            .as_ref()
            .ok_or_else(|| ChatError::validation("not signed in"))
    }

    /// Open the chat with `friend_id`, replacing the open one.
    pub async fn open_chat(&mut self, friend_id: &str) -> ChatResult<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| ChatError::validation("not signed in"))?;
        let previous = active.chat.chat_id().map(str::to_owned);
        let history = active.chat.open(friend_id).await?;
        if let Some(previous) = previous {
            self.projector.chat_closed(&previous);
        }
        let chat_id = crate::chat::chat_id(&active.user.uid, friend_id);
        self.projector.chat_opened(friend_id, &chat_id, history);
        Ok(())
    }

    pub async fn send_message(&self, text: &str) -> ChatResult<String> {
        self.active()?.chat.send(text).await
    }

    pub fn close_chat(&mut self) {
        let closed = self.active.as_mut().and_then(|a| a.chat.close());
        if let Some(chat_id) = closed {
            self.projector.chat_closed(&chat_id);
        }
    }

    pub async fn request_friend(&self, email: &str) -> ChatResult<String> {
        self.active()?.flow.request(email).await
    }

    pub async fn accept_request(&self, friendship_id: &str) -> ChatResult<()> {
        self.active()?.flow.accept(friendship_id).await
    }

    /// Apply one subscription batch to the caches and the projector.
    /// Error events are logged; the subscription stays open.
    pub fn handle(&mut self, event: SessionEvent) {
        let source = event.source();
        let Some(active) = self.active.as_mut() else {
            debug!(source, "dropping batch for ended session");
            return;
        };
        let me = active.user.uid.as_str();
        match event {
            SessionEvent::Friends(Ok(ChangeBatch::Snapshot(docs))) => {
                let entries = entries_from_snapshot(me, &docs);
                self.friends.replace(entries, &mut self.projector);
            }
            SessionEvent::Requests(Ok(ChangeBatch::Snapshot(docs))) => {
                active.flow.apply_snapshot(&docs, &mut self.projector);
            }
            SessionEvent::Recent(Ok(ChangeBatch::Snapshot(docs))) => {
                self.recent.apply_snapshot(me, &docs, &mut self.projector);
            }
            SessionEvent::Chat(Ok(ChangeBatch::Changes(changes))) => {
                let appended: Vec<Message> = active.chat.apply_changes(changes);
                if let Some(chat_id) = active.chat.chat_id() {
                    for message in &appended {
                        self.projector.message_appended(chat_id, message);
                    }
                }
            }
            SessionEvent::Friends(Err(e))
            | SessionEvent::Requests(Err(e))
            | SessionEvent::Recent(Err(e))
            | SessionEvent::Chat(Err(e)) => {
                warn!(source, error = %e, "subscription error");
            }
            _ => warn!(source, "unexpected batch shape"),
        }
    }

    /// Take the next already-buffered batch, if any.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        let active = self.active.as_mut()?;
        if let Some(e) = active.friends.try_next() {
            return Some(SessionEvent::Friends(e));
        }
        if let Some(e) = active.requests.try_next() {
            return Some(SessionEvent::Requests(e));
        }
        if let Some(e) = active.recent.as_mut().and_then(Subscription::try_next) {
            return Some(SessionEvent::Recent(e));
        }
        active.chat.try_next_event().map(SessionEvent::Chat)
    }

    /// Handle every buffered batch. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next batch from any subscription. `None` when no session
    /// is active or every subscription has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let Active {
            friends,
            requests,
            recent,
            chat,
            ..
        } = self.active.as_mut()?;
        tokio::select! {
            Some(e) = friends.next() => Some(SessionEvent::Friends(e)),
            Some(e) = requests.next() => Some(SessionEvent::Requests(e)),
            Some(e) = next_if_open(recent.as_mut()) => Some(SessionEvent::Recent(e)),
            Some(e) = chat.next_event() => Some(SessionEvent::Chat(e)),
            else => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.active.as_ref().map(|a| &a.user)
    }

    /// Live subscriptions held by this session, including the chat's.
    pub fn active_subscriptions(&self) -> usize {
        self.active.as_ref().map_or(0, |a| {
            2 + usize::from(a.recent.is_some()) + a.chat.subscription_count()
        })
    }

    pub fn friends(&self) -> &FriendshipIndex {
        &self.friends
    }

    pub fn recent(&self) -> &RecentConversations {
        &self.recent
    }

    pub fn incoming_requests(&self) -> &[Friendship] {
        self.active
            .as_ref()
            .map(|a| a.flow.incoming())
            .unwrap_or_default()
    }

    pub fn chat(&self) -> Option<&ChatSession> {
        self.active.as_ref().map(|a| &a.chat)
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }

    pub fn projector_mut(&mut self) -> &mut P {
        &mut self.projector
    }
}

impl<P: Projector> Drop for Session<P> {
    fn drop(&mut self) {
        self.end();
    }
}
