use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use store_api::{
    server_timestamp, to_fields, ChangeKind, Direction, DocumentChange, DocumentStore, Query,
    Subscription, SubscriptionEvent, SubscriptionMode,
};
use tracing::{debug, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::model::{FromDocument, Message, MESSAGES};

/// Conversation id shared by both participants: the sorted pair joined by `_`.
pub fn chat_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}_{hi}")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    chat_id: &'a str,
    sender_id: &'a str,
    receiver_id: &'a str,
    text: &'a str,
    participants: [&'a str; 2],
    read: bool,
}

#[derive(Debug)]
struct ActiveChat {
    friend_id: String,
    chat_id: String,
    messages: Vec<Message>,
    seen: HashSet<String>,
    subscription: Subscription,
    /// The live query's first batch replays the whole conversation. Until it
    /// arrives, holds the oldest loaded timestamp when history was cut short.
    replay_floor: Option<Option<i64>>,
}

impl ActiveChat {
    /// Timestamp of the oldest message loaded with the history.
    fn oldest_loaded(&self) -> Option<i64> {
        self.messages.iter().filter_map(|m| m.timestamp).min()
    }

    /// Append unless this document was already shown.
    fn push(&mut self, message: Message) -> Option<&Message> {
        if !self.seen.insert(message.id.clone()) {
            return None;
        }
        self.messages.push(message);
        self.messages.last()
    }
}

/// The single open one-to-one conversation.
///
/// Messages are kept in delivery order. Each message document is shown at
/// most once, so the live query's initial replay of the history does not
/// duplicate it.
pub struct ChatSession {
    store: Arc<dyn DocumentStore>,
    me: String,
    history_limit: usize,
    active: Option<ActiveChat>,
}

impl ChatSession {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        me: impl Into<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            me: me.into(),
            history_limit,
            active: None,
        }
    }

    /// Open the conversation with `friend_id`, replacing any open one.
    ///
    /// Loads the latest `history_limit` messages, then starts the live query.
    /// On failure the previously open chat is left untouched.
    pub async fn open(&mut self, friend_id: &str) -> ChatResult<&[Message]> {
        if friend_id.trim().is_empty() {
            return Err(ChatError::validation("choose a friend to chat with"));
        }
        let chat_id = chat_id(&self.me, friend_id);
        let recent = Query::collection(MESSAGES)
            .where_eq("chatId", chat_id.as_str())
            .order_by("timestamp", Direction::Desc)
            .limit(self.history_limit);
        let docs = self.store.query(&recent).await?;
        let live = Query::collection(MESSAGES)
            .where_eq("chatId", chat_id.as_str())
            .order_by("timestamp", Direction::Asc);
        let subscription = self.store.subscribe(live, SubscriptionMode::Incremental)?;

        self.close();
        let mut chat = ActiveChat {
            friend_id: friend_id.to_string(),
            chat_id,
            messages: Vec::with_capacity(docs.len()),
            seen: HashSet::new(),
            subscription,
            replay_floor: None,
        };
        for doc in docs.iter().rev() {
            match Message::from_document(doc) {
                Ok(message) => {
                    chat.push(message);
                }
                Err(e) => warn!(error = %e, "skipping malformed message"),
            }
        }
        let truncated = docs.len() >= self.history_limit;
        chat.replay_floor = Some(chat.oldest_loaded().filter(|_| truncated));
        info!(chat = %chat.chat_id, history = chat.messages.len(), "chat opened");
        let chat = self.active.insert(chat);
        Ok(&chat.messages)
    }

    /// Send `text` to the open chat. Nothing is echoed locally; the message
    /// shows up when the live query delivers it.
    pub async fn send(&self, text: &str) -> ChatResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::validation("message is empty"));
        }
        let chat = self
            .active
            .as_ref()
            .ok_or_else(|| ChatError::validation("no chat is open"))?;
        let outgoing = OutgoingMessage {
            chat_id: &chat.chat_id,
            sender_id: &self.me,
            receiver_id: &chat.friend_id,
            text,
            participants: [&self.me, &chat.friend_id],
            read: false,
        };
        let mut fields = to_fields(&outgoing)?;
        fields.insert("timestamp".into(), server_timestamp());
        let id = self.store.add(MESSAGES, fields).await?;
        debug!(chat = %chat.chat_id, message = %id, "message sent");
        Ok(id)
    }

    /// Stop the live query and forget the open chat. Returns the closed chat
    /// id, or `None` when nothing was open.
    pub fn close(&mut self) -> Option<String> {
        let mut chat = self.active.take()?;
        if let Err(e) = chat.subscription.cancel() {
            warn!(chat = %chat.chat_id, error = %e, "failed to cancel chat subscription");
        }
        Some(chat.chat_id)
    }

    /// Append the `added` documents of a live batch, returning the messages
    /// that were new. Modifications and removals are ignored.
    pub fn apply_changes(&mut self, changes: Vec<DocumentChange>) -> Vec<Message> {
        let Some(chat) = self.active.as_mut() else {
            return Vec::new();
        };
        // Replayed entries already shown are dropped by `push`; the ones
        // older than a cut-short history window are dropped here.
        let replay_floor = chat.replay_floor.take().flatten();
        let mut appended = Vec::new();
        for change in changes {
            if change.kind != ChangeKind::Added {
                continue;
            }
            match Message::from_document(&change.document) {
                Ok(message) => {
                    let replayed = matches!(
                        (replay_floor, message.timestamp),
                        (Some(floor), Some(ts)) if ts < floor
                    );
                    if replayed {
                        continue;
                    }
                    if let Some(message) = chat.push(message) {
                        appended.push(message.clone());
                    }
                }
                Err(e) => warn!(error = %e, "skipping malformed message"),
            }
        }
        appended
    }

    /// Wait for the next batch of the live query.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        match self.active.as_mut() {
            Some(chat) => chat.subscription.next().await,
            None => None,
        }
    }

    pub fn try_next_event(&mut self) -> Option<SubscriptionEvent> {
        self.active.as_mut()?.subscription.try_next()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.chat_id.as_str())
    }

    pub fn friend_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.friend_id.as_str())
    }

    pub fn messages(&self) -> &[Message] {
        self.active
            .as_ref()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    /// Number of live subscriptions held (zero or one).
    pub fn subscription_count(&self) -> usize {
        usize::from(self.active.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_is_order_independent() {
        let pairs = [("u1", "u2"), ("b", "a"), ("same", "same"), ("Zed", "amy")];
        for (a, b) in pairs {
            assert_eq!(chat_id(a, b), chat_id(b, a));
        }
        assert_eq!(chat_id("u2", "u1"), "u1_u2");
        assert_ne!(chat_id("u1", "u2"), chat_id("u1", "u3"));
    }

    fn stored(id: &str, ts: i64) -> store_api::Document {
        let fields = to_fields(&serde_json::json!({
            "chatId": "u1_u2",
            "senderId": "u2",
            "receiverId": "u1",
            "text": id,
            "timestamp": ts
        }))
        .unwrap();
        store_api::Document::new(id, fields)
    }

    fn added(docs: &[store_api::Document]) -> Vec<DocumentChange> {
        docs.iter()
            .map(|d| DocumentChange {
                kind: ChangeKind::Added,
                document: d.clone(),
            })
            .collect()
    }

    async fn seeded(history_limit: usize, docs: &[store_api::Document]) -> ChatSession {
        let store = memstore::MemoryStore::new();
        for doc in docs {
            store.set(MESSAGES, &doc.id, doc.fields.clone()).await.unwrap();
        }
        let mut chat = ChatSession::new(Arc::new(store), "u1", history_limit);
        chat.open("u2").await.unwrap();
        chat
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn replay_keeps_late_arrival_older_than_newest() {
        let history = [stored("a", 10), stored("c", 30)];
        let mut chat = seeded(50, &history).await;
        // "b" landed between the history fetch and the live query
        let replay = [stored("a", 10), stored("b", 20), stored("c", 30)];
        let appended = chat.apply_changes(added(&replay));
        assert_eq!(ids(&appended), ["b"]);
        assert_eq!(ids(chat.messages()), ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn replay_skips_messages_before_cut_short_history() {
        let history = [stored("a", 10), stored("b", 20), stored("c", 30)];
        let mut chat = seeded(2, &history).await;
        assert_eq!(ids(chat.messages()), ["b", "c"]);
        let replay = [
            stored("a", 10),
            stored("b", 20),
            stored("late", 25),
            stored("c", 30),
        ];
        let appended = chat.apply_changes(added(&replay));
        assert_eq!(ids(&appended), ["late"]);

        // only the first batch is a replay
        let appended = chat.apply_changes(added(&[stored("old", 5)]));
        assert_eq!(ids(&appended), ["old"]);
    }
}
