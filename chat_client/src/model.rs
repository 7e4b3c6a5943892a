use serde::{Deserialize, Serialize};
use store_api::{Document, StoreResult};

pub const USERS: &str = "users";
pub const FRIENDSHIPS: &str = "friendships";
pub const MESSAGES: &str = "messages";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    Offline,
}

/// `lastSeen` is written as an RFC 3339 string at registration and as a
/// server timestamp at logout.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LastSeen {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub status: Presence,
    #[serde(default)]
    pub last_seen: Option<LastSeen>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    #[serde(skip)]
    pub id: String,
    /// The two participant ids.
    pub users: Vec<String>,
    pub status: FriendshipStatus,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Friendship {
    pub fn involves(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }

    /// The participant that is not `me`.
    pub fn other_participant(&self, me: &str) -> Option<&str> {
        self.users.iter().map(String::as_str).find(|u| *u != me)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip)]
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    /// Epoch milliseconds assigned by the backend.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub read: bool,
}

/// Records stored as documents whose id is not part of the field map.
pub trait FromDocument: Sized {
    fn from_document(doc: &Document) -> StoreResult<Self>;
}

macro_rules! impl_from_document {
    ($($ty:ty),*) => {
        $(impl FromDocument for $ty {
            fn from_document(doc: &Document) -> StoreResult<Self> {
                let mut record: $ty = doc.decode()?;
                record.id = doc.id.clone();
                Ok(record)
            }
        })*
    };
}

impl_from_document!(User, Friendship, Message);
