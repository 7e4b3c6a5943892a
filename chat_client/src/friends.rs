use std::collections::BTreeMap;

use store_api::Document;
use tracing::{debug, warn};

use crate::model::{FromDocument, Friendship};
use crate::projector::{FriendsView, Projector};

/// One element of a friendship snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEntry {
    pub friend_id: String,
    pub friendship: Friendship,
}

/// Turn a snapshot of accepted friendships into entries keyed by the other
/// participant. Documents that do not decode are skipped.
pub fn entries_from_snapshot(me: &str, docs: &[Document]) -> Vec<FriendEntry> {
    docs.iter()
        .filter_map(|doc| match Friendship::from_document(doc) {
            Ok(friendship) => {
                let friend_id = friendship.other_participant(me)?.to_string();
                Some(FriendEntry {
                    friend_id,
                    friendship,
                })
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed friendship");
                None
            }
        })
        .collect()
}

/// Friend id → accepted friendship, replaced wholesale on every snapshot.
#[derive(Debug, Default, Clone)]
pub struct FriendshipIndex {
    friends: BTreeMap<String, Friendship>,
}

impl FriendshipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the full result set and notify the projector once.
    ///
    /// The new map is built aside and then moved in, so readers only ever see
    /// the old or the new snapshot. Later entries for the same friend win.
    pub fn replace(&mut self, batch: Vec<FriendEntry>, projector: &mut dyn Projector) {
        let next: BTreeMap<String, Friendship> = batch
            .into_iter()
            .map(|e| (e.friend_id, e.friendship))
            .collect();
        self.friends = next;
        debug!(count = self.friends.len(), "friendship index replaced");
        if self.friends.is_empty() {
            projector.friends_replaced(FriendsView::NoFriends);
        } else {
            projector.friends_replaced(FriendsView::Friends(&self.friends));
        }
    }

    pub fn get(&self, friend_id: &str) -> Option<&Friendship> {
        self.friends.get(friend_id)
    }

    pub fn contains(&self, friend_id: &str) -> bool {
        self.friends.contains_key(friend_id)
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    pub fn friend_ids(&self) -> impl Iterator<Item = &str> {
        self.friends.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.friends.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FriendshipStatus;
    use crate::projector::{Projection, RecordingProjector};
    use serde_json::json;
    use store_api::to_fields;

    fn accepted(a: &str, b: &str) -> Friendship {
        Friendship {
            id: format!("{a}-{b}"),
            users: vec![a.into(), b.into()],
            status: FriendshipStatus::Accepted,
            sender_id: a.into(),
            receiver_id: b.into(),
            created_at: None,
        }
    }

    fn entry(me: &str, friend: &str) -> FriendEntry {
        FriendEntry {
            friend_id: friend.into(),
            friendship: accepted(me, friend),
        }
    }

    #[test]
    fn same_batch_twice_is_idempotent() {
        let mut index = FriendshipIndex::new();
        let mut projector = RecordingProjector::default();
        let batch = vec![entry("u1", "u2"), entry("u1", "u3")];
        index.replace(batch.clone(), &mut projector);
        let first = index.clone();
        index.replace(batch, &mut projector);
        assert_eq!(index.friends, first.friends);
        assert_eq!(projector.friends_notifications(), 2);
    }

    #[test]
    fn empty_batch_projects_no_friends() {
        let mut index = FriendshipIndex::new();
        let mut projector = RecordingProjector::default();
        index.replace(vec![entry("u1", "u2")], &mut projector);
        index.replace(Vec::new(), &mut projector);
        assert!(index.is_empty());
        assert_eq!(projector.calls.last(), Some(&Projection::NoFriends));
    }

    #[test]
    fn unknown_friend_is_not_found() {
        let mut index = FriendshipIndex::new();
        index.replace(vec![entry("u1", "u2")], &mut RecordingProjector::default());
        assert!(index.get("u2").is_some());
        assert!(index.get("u9").is_none());
    }

    #[test]
    fn snapshot_entries_skip_bad_documents() {
        let good = Document::new(
            "f1",
            to_fields(&json!({
                "users": ["u1", "u2"],
                "status": "accepted",
                "senderId": "u2",
                "receiverId": "u1"
            }))
            .unwrap(),
        );
        let bad = Document::new("f2", to_fields(&json!({"users": "u1"})).unwrap());
        let entries = entries_from_snapshot("u1", &[good, bad]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].friend_id, "u2");
        assert_eq!(entries[0].friendship.id, "f1");
    }
}
