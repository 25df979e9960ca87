//! crates/inventory_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of the concrete document store, authentication
//! backend, and file-parsing implementations.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::{RawRecord, User};

/// The document store rejects atomic batches larger than this many
/// operations. An external constraint of the store, not a business rule.
pub const MAX_BATCH_OPS: usize = 500;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by every port operation.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// No current user identity is available.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    /// A removal asked for more units than the item currently holds.
    /// The document is left untouched.
    #[error("insufficient stock: {requested} requested, {available} available")]
    InsufficientStock { available: u32, requested: u32 },

    /// A single record failed validation (empty name, non-numeric or
    /// non-positive quantity).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// A persistence failure. Transient: callers may retry.
    #[error("store write failed: {0}")]
    StoreWrite(String),

    #[error("store read failed: {0}")]
    StoreRead(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document Store Port
//=========================================================================================

/// A document together with the store's version counter for that document,
/// used as the optimistic-concurrency token on writes.
#[derive(Debug, Clone)]
pub struct VersionedDoc {
    pub fields: Value,
    pub version: u64,
}

/// The document store contract, keyed by `(collection path, document id)`.
///
/// `set` with `merge` leaves unnamed fields untouched; without it the
/// document is replaced wholesale. `set_if_version` is the CAS variant that
/// protects read-modify-write cycles: `expected = None` means "create only",
/// and `Ok(false)` signals a version conflict without any mutation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<VersionedDoc>>;

    async fn set(&self, collection: &str, id: &str, fields: Value, merge: bool) -> PortResult<()>;

    async fn set_if_version(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        merge: bool,
        expected: Option<u64>,
    ) -> PortResult<bool>;

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;

    /// Every document in the collection, `(id, fields)`, in store-native
    /// order. Ordering is a presentation concern layered on top.
    async fn list_all(&self, collection: &str) -> PortResult<Vec<(String, Value)>>;

    /// Starts an atomic batch. All queued operations in one batch commit or
    /// fail together; the batch must not exceed [`MAX_BATCH_OPS`] operations.
    fn batch(&self) -> Box<dyn StoreBatch>;
}

/// A pending atomic batch of store writes.
#[async_trait]
pub trait StoreBatch: Send {
    /// Queues a full-document upsert.
    fn queue_set(&mut self, collection: &str, id: &str, fields: Value);

    /// Queues a merge into an existing document.
    fn queue_update(&mut self, collection: &str, id: &str, fields: Value);

    async fn commit(self: Box<Self>) -> PortResult<()>;
}

//=========================================================================================
// Authentication Ports
//=========================================================================================

/// The narrow identity dependency of the repository and importer: "who is
/// the current user, if anyone". Consulted on every call rather than cached,
/// so an external session change takes effect immediately.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> PortResult<Option<User>>;
}

/// The full authentication contract. `subscribe` hands out a channel that
/// observes auth-state changes (login, logout) as they happen.
#[async_trait]
pub trait AuthService: IdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<User>;

    /// Returns an opaque session token on success.
    async fn log_in(&self, email: &str, password: &str) -> PortResult<String>;

    async fn log_out(&self, session_token: &str) -> PortResult<()>;

    /// Maps a session token back to its user, for request middleware.
    async fn resolve_session(&self, session_token: &str) -> PortResult<User>;

    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

/// An `IdentityProvider` pinned to one identity (or to none), used to scope
/// a repository to an already-authenticated request and as a test double.
#[derive(Debug, Clone)]
pub struct FixedIdentity(Option<User>);

impl FixedIdentity {
    pub fn user(user: User) -> Self {
        Self(Some(user))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_user(&self) -> PortResult<Option<User>> {
        Ok(self.0.clone())
    }
}

//=========================================================================================
// File Input Port
//=========================================================================================

/// Decodes an uploaded tabular file into raw `{name, quantity}` records.
/// Dispatches on the file extension; anything other than `.csv`, `.xlsx`,
/// or `.xls` fails with [`PortError::UnsupportedFormat`].
pub trait SheetParser: Send + Sync {
    fn parse(&self, file_name: &str, bytes: &[u8]) -> PortResult<Vec<RawRecord>>;
}
