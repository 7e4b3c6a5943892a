use std::collections::BTreeMap;

use store_api::AuthUser;

use crate::model::{Friendship, Message, User};
use crate::recent::Conversation;

/// What the friends panel should show after a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendsView<'a> {
    NoFriends,
    Friends(&'a BTreeMap<String, Friendship>),
}

/// Render hooks called after each state change. The UI layer implements the
/// ones it cares about.
pub trait Projector: Send {
    fn signed_in(&mut self, _user: &AuthUser) {}
    fn signed_out(&mut self) {}
    fn profile_loaded(&mut self, _user: &User) {}
    fn friends_replaced(&mut self, _view: FriendsView<'_>) {}
    fn requests_replaced(&mut self, _incoming: &[Friendship]) {}
    fn conversations_replaced(&mut self, _conversations: &[Conversation]) {}
    fn chat_opened(&mut self, _friend_id: &str, _chat_id: &str, _history: &[Message]) {}
    fn message_appended(&mut self, _chat_id: &str, _message: &Message) {}
    fn chat_closed(&mut self, _chat_id: &str) {}
    fn session_cleared(&mut self) {}
    fn notify(&mut self, _title: &str, _message: &str) {}
}

/// One recorded projector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    SignedIn(String),
    SignedOut,
    Profile(User),
    NoFriends,
    Friends(Vec<String>),
    Requests(Vec<String>),
    Conversations(Vec<String>),
    ChatOpened {
        friend_id: String,
        chat_id: String,
        history: Vec<String>,
    },
    MessageAppended {
        chat_id: String,
        text: String,
    },
    ChatClosed(String),
    SessionCleared,
    Notice {
        title: String,
        message: String,
    },
}

/// Projector that keeps every call, for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingProjector {
    pub calls: Vec<Projection>,
}

impl RecordingProjector {
    /// Number of friends projections (including empty ones) seen so far.
    pub fn friends_notifications(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Projection::NoFriends | Projection::Friends(_)))
            .count()
    }

    /// Texts appended to the given chat, in append order.
    pub fn appended(&self, chat_id: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Projection::MessageAppended { chat_id: id, text } if id == chat_id => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Projector for RecordingProjector {
    fn signed_in(&mut self, user: &AuthUser) {
        self.calls.push(Projection::SignedIn(user.uid.clone()));
    }

    fn signed_out(&mut self) {
        self.calls.push(Projection::SignedOut);
    }

    fn profile_loaded(&mut self, user: &User) {
        self.calls.push(Projection::Profile(user.clone()));
    }

    fn friends_replaced(&mut self, view: FriendsView<'_>) {
        self.calls.push(match view {
            FriendsView::NoFriends => Projection::NoFriends,
            FriendsView::Friends(map) => Projection::Friends(map.keys().cloned().collect()),
        });
    }

    fn requests_replaced(&mut self, incoming: &[Friendship]) {
        self.calls.push(Projection::Requests(
            incoming.iter().map(|f| f.id.clone()).collect(),
        ));
    }

    fn conversations_replaced(&mut self, conversations: &[Conversation]) {
        self.calls.push(Projection::Conversations(
            conversations.iter().map(|c| c.chat_id.clone()).collect(),
        ));
    }

    fn chat_opened(&mut self, friend_id: &str, chat_id: &str, history: &[Message]) {
        self.calls.push(Projection::ChatOpened {
            friend_id: friend_id.into(),
            chat_id: chat_id.into(),
            history: history.iter().map(|m| m.text.clone()).collect(),
        });
    }

    fn message_appended(&mut self, chat_id: &str, message: &Message) {
        self.calls.push(Projection::MessageAppended {
            chat_id: chat_id.into(),
            text: message.text.clone(),
        });
    }

    fn chat_closed(&mut self, chat_id: &str) {
        self.calls.push(Projection::ChatClosed(chat_id.into()));
    }

    fn session_cleared(&mut self) {
        self.calls.push(Projection::SessionCleared);
    }

    fn notify(&mut self, title: &str, message: &str) {
        self.calls.push(Projection::Notice {
            title: title.into(),
            message: message.into(),
        });
    }
}
