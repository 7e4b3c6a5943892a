//! Contract between the chat client and its hosted backend: documents,
//! queries, live subscriptions and the authentication provider.

pub mod auth;
pub mod document;
pub mod error;
pub mod query;
pub mod subscription;

pub use auth::{AuthProvider, AuthStateStream, AuthUser, FederatedProvider};
pub use document::{
    is_server_timestamp, server_timestamp, to_fields, Document, Fields, SERVER_TIMESTAMP_KEY,
};
pub use error::{StoreError, StoreResult};
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};
pub use subscription::{
    ChangeBatch, ChangeKind, DocumentChange, Subscription, SubscriptionEvent, SubscriptionId,
    SubscriptionMode, Unsubscribe,
};

use futures::future::BoxFuture;

/// Hosted collection store.
///
/// Reads and writes are asynchronous and resolve according to the backend's
/// own contract; nothing here retries. Subscriptions are handed out as
/// [`Subscription`] handles whose batches are drained by the caller.
pub trait DocumentStore: Send + Sync {
    fn query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, StoreResult<Vec<Document>>>;

    /// Open a live query. The first batch describes the current result set.
    fn subscribe(&self, query: Query, mode: SubscriptionMode) -> StoreResult<Subscription>;

    /// Insert a document under a generated id and return that id.
    fn add<'a>(
        &'a self,
        collection: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<String>>;

    /// Create or overwrite the document with the given id.
    fn set<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Merge fields into an existing document.
    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Document>>>;
}
