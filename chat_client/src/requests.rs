use std::sync::Arc;

use serde::Serialize;
use store_api::{server_timestamp, to_fields, Document, DocumentStore, Query};
use tracing::{info, warn};

use crate::error::{ChatError, ChatResult};
use crate::model::{FriendshipStatus, FromDocument, Friendship, FRIENDSHIPS, USERS};
use crate::projector::Projector;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewRequest<'a> {
    users: [&'a str; 2],
    sender_id: &'a str,
    receiver_id: &'a str,
    status: FriendshipStatus,
}

/// Sending, accepting and listing friend requests for one signed-in user.
pub struct FriendRequests {
    store: Arc<dyn DocumentStore>,
    me: String,
    my_email: Option<String>,
    incoming: Vec<Friendship>,
}

impl FriendRequests {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        me: impl Into<String>,
        my_email: Option<String>,
    ) -> Self {
        Self {
            store,
            me: me.into(),
            my_email,
            incoming: Vec::new(),
        }
    }

    /// Send a friend request to the account registered under `email`.
    /// Returns the id of the new pending friendship.
    pub async fn request(&self, email: &str) -> ChatResult<String> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ChatError::validation("enter an email address"));
        }
        if self
            .my_email
            .as_deref()
            .is_some_and(|mine| mine.eq_ignore_ascii_case(email))
        {
            return Err(ChatError::validation("you cannot add yourself as a friend"));
        }

        let lookup = Query::collection(USERS).where_eq("email", email).limit(1);
        let target = self
            .store
            .query(&lookup)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::NotFound(format!("no user with email {email}")))?;
        if target.id == self.me {
            return Err(ChatError::validation("you cannot add yourself as a friend"));
        }

        let existing = Query::collection(FRIENDSHIPS)
            .where_array_contains("users", self.me.as_str())
            .where_array_contains("users", target.id.as_str())
            .limit(1);
        if !self.store.query(&existing).await?.is_empty() {
            return Err(ChatError::Duplicate(
                "a friend request already exists for this user".into(),
            ));
        }

        let request = NewRequest {
            users: [&self.me, &target.id],
            sender_id: &self.me,
            receiver_id: &target.id,
            status: FriendshipStatus::Pending,
        };
        let mut fields = to_fields(&request)?;
        fields.insert("createdAt".into(), server_timestamp());
        let id = self.store.add(FRIENDSHIPS, fields).await?;
        info!(friendship = %id, to = %target.id, "friend request sent");
        Ok(id)
    }

    /// Accept a pending request addressed to the current user.
    pub async fn accept(&self, friendship_id: &str) -> ChatResult<()> {
        let doc = self
            .store
            .get(FRIENDSHIPS, friendship_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("friend request {friendship_id}")))?;
        let friendship = Friendship::from_document(&doc)?;
        if friendship.receiver_id != self.me {
            return Err(ChatError::validation(
                "only the receiver can accept a friend request",
            ));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(ChatError::validation("friend request is not pending"));
        }
        let mut fields = store_api::Fields::new();
        fields.insert("status".into(), "accepted".into());
        self.store.update(FRIENDSHIPS, friendship_id, fields).await?;
        info!(friendship = %friendship_id, from = %friendship.sender_id, "friend request accepted");
        Ok(())
    }

    /// Replace the incoming list with a snapshot of pending requests.
    pub fn apply_snapshot(&mut self, docs: &[Document], projector: &mut dyn Projector) {
        self.incoming = docs
            .iter()
            .filter_map(|doc| match Friendship::from_document(doc) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(error = %e, "skipping malformed friend request");
                    None
                }
            })
            .collect();
        projector.requests_replaced(&self.incoming);
    }

    pub fn incoming(&self) -> &[Friendship] {
        &self.incoming
    }

    pub fn clear(&mut self) {
        self.incoming.clear();
    }
}

/// Query for requests addressed to `uid` that are still pending.
pub fn incoming_query(uid: &str) -> Query {
    Query::collection(FRIENDSHIPS)
        .where_eq("receiverId", uid)
        .where_eq("status", "pending")
}

/// Query for accepted friendships that include `uid`.
pub fn friends_query(uid: &str) -> Query {
    Query::collection(FRIENDSHIPS)
        .where_array_contains("users", uid)
        .where_eq("status", "accepted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use memstore::MemoryStore;

    fn requests(store: &MemoryStore, me: &str, email: &str) -> FriendRequests {
        FriendRequests::new(Arc::new(store.clone()), me, Some(email.into()))
    }

    #[tokio::test]
    async fn blank_or_own_email_is_rejected_without_io() {
        let store = MemoryStore::new();
        store.fail_reads(Some(store_api::StoreError::Unavailable("offline".into())));
        let flow = requests(&store, "u1", "ann@example.org");
        for email in ["", "   ", "ann@example.org", " ANN@example.org "] {
            let err = flow.request(email).await.unwrap_err();
            assert!(matches!(err, ChatError::Validation(_)), "{email:?}: {err:?}");
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let store = MemoryStore::new();
        let flow = requests(&store, "u1", "ann@example.org");
        let err = flow.request("nobody@example.org").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn queries_select_expected_documents() {
        let pending = store_api::to_fields(&serde_json::json!({
            "users": ["u1", "u2"], "status": "pending", "senderId": "u1", "receiverId": "u2"
        }))
        .unwrap();
        assert!(incoming_query("u2").matches(&pending));
        assert!(!incoming_query("u1").matches(&pending));
        assert!(!friends_query("u1").matches(&pending));
    }
}
