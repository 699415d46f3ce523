//! Abstraction over the remote key/value secret store.
//!
//! The resolver only ever sees this trait; the concrete Azure Key Vault
//! client lives in [`azure`], its token plumbing in [`auth`].

pub mod auth;
pub mod azure;

pub use crate::error::StoreError;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Fixed per-call deadline for store operations, measured from call start.
/// Never shared or extended; a timeout propagates immediately.
pub const STORE_DEADLINE: Duration = Duration::from_millis(5000);

/// One item read from the store: a read-only snapshot valid for the
/// duration of a single resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub store_name: String,
    pub tags: HashMap<String, Option<String>>,
}

/// Client capability against the remote secret store.
///
/// Both operations establish their own fixed deadline and perform no
/// retries. Dropping the future aborts the in-flight network call.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Enumerate all entries currently in the named store, each carrying
    /// its key, resolved current value, and tags.
    async fn list_entries(&self, store_name: &str) -> Result<Vec<Entry>, StoreError>;

    /// Retrieve the current (latest) value of a single named entry.
    async fn fetch_entry(&self, store_name: &str, key: &str) -> Result<Entry, StoreError>;
}
