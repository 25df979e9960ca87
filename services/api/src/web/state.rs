//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request wiring of the
//! core components.

use crate::config::Config;
use inventory_core::domain::User;
use inventory_core::ports::{AuthService, DocumentStore, FixedIdentity, SheetParser};
use inventory_core::{BatchImporter, ItemRepository};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthService>,
    pub sheets: Arc<dyn SheetParser>,
    pub config: Arc<Config>,
}

impl AppState {
    /// An item repository scoped to the request's authenticated user. The
    /// repository consults its identity on every call, so handlers pin the
    /// identity the middleware already resolved.
    pub fn repository_for(&self, user: User) -> ItemRepository {
        ItemRepository::new(self.store.clone(), Arc::new(FixedIdentity::user(user)))
    }

    /// A batch importer scoped to the request's authenticated user, with
    /// default chunking and retry policy.
    pub fn importer_for(&self, user: User) -> BatchImporter {
        BatchImporter::new(self.store.clone(), Arc::new(FixedIdentity::user(user)))
    }
}
