use std::collections::HashSet;

use store_api::Document;
use tracing::warn;

use crate::model::{FromDocument, Message};
use crate::projector::Projector;

/// Latest message of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub chat_id: String,
    pub partner_id: String,
    pub last_message: Message,
}

/// Conversations the user took part in, newest first.
#[derive(Debug, Default)]
pub struct RecentConversations {
    conversations: Vec<Conversation>,
}

impl RecentConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a snapshot of messages ordered newest first. The first
    /// message seen for a chat is its latest one.
    pub fn apply_snapshot(&mut self, me: &str, docs: &[Document], projector: &mut dyn Projector) {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for doc in docs {
            let message = match Message::from_document(doc) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "skipping malformed message");
                    continue;
                }
            };
            if !seen.insert(message.chat_id.clone()) {
                continue;
            }
            let partner_id = if message.sender_id == me {
                message.receiver_id.clone()
            } else {
                message.sender_id.clone()
            };
            next.push(Conversation {
                chat_id: message.chat_id.clone(),
                partner_id,
                last_message: message,
            });
        }
        self.conversations = next;
        projector.conversations_replaced(&self.conversations);
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::{Projection, RecordingProjector};
    use serde_json::json;
    use store_api::to_fields;

    fn message(id: &str, from: &str, to: &str, text: &str, ts: i64) -> Document {
        let chat = crate::chat::chat_id(from, to);
        Document::new(
            id,
            to_fields(&json!({
                "chatId": chat,
                "senderId": from,
                "receiverId": to,
                "text": text,
                "timestamp": ts,
                "participants": [from, to],
                "read": false
            }))
            .unwrap(),
        )
    }

    #[test]
    fn keeps_newest_message_per_chat() {
        let docs = [
            message("m4", "u3", "u1", "yo", 40),
            message("m3", "u1", "u2", "later", 30),
            message("m2", "u2", "u1", "earlier", 20),
            message("m1", "u1", "u3", "first", 10),
        ];
        let mut recent = RecentConversations::new();
        let mut projector = RecordingProjector::default();
        recent.apply_snapshot("u1", &docs, &mut projector);

        let list = recent.conversations();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].chat_id, "u1_u3");
        assert_eq!(list[0].partner_id, "u3");
        assert_eq!(list[0].last_message.text, "yo");
        assert_eq!(list[1].partner_id, "u2");
        assert_eq!(list[1].last_message.text, "later");
        assert_eq!(
            projector.calls,
            [Projection::Conversations(vec!["u1_u3".into(), "u1_u2".into()])]
        );
    }
}
