//! Client-side state for a friend chat backed by a hosted document store.
//!
//! [`app::ChatApp`] follows the auth state and owns a [`session::Session`],
//! which keeps the friendship index, incoming requests, recent conversations
//! and the open chat in step with the store's live queries. State changes
//! are reported through a [`projector::Projector`].

pub mod account;
pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod friends;
pub mod model;
pub mod projector;
pub mod recent;
pub mod requests;
pub mod session;

pub use app::{AppEvent, ChatApp};
pub use error::{ChatError, ChatResult};
pub use projector::Projector;
pub use session::{Session, SessionEvent, SessionSettings};
