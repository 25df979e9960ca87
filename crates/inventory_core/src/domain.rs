//! crates/inventory_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database, except for the wire names
//! of item document fields, which are pinned to the camelCase names the
//! document store uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle status of an inventory item.
///
/// `Inactive` is a soft delete: the document is retained with zero stock
/// so the item's history (and `totalReceived`) survives a full removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Inactive,
}

/// A named, quantity-tracked inventory record scoped to one user.
///
/// The document id in the store is the lowercase-normalized name, which is
/// also mirrored into the `name` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Defaults to empty when decoding a legacy document without the field;
    /// readers overwrite it with the document id.
    #[serde(default)]
    pub name: String,
    pub quantity: u32,
    pub status: ItemStatus,
    /// Absent on documents written before the timestamp was introduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    /// Cumulative units ever added; never decreases.
    #[serde(default)]
    pub total_received: u64,
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// One row decoded from an uploaded CSV/spreadsheet file, before validation.
/// The quantity stays a string here; the importer owns parsing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub name: String,
    pub quantity: String,
}

/// A record the importer refused, with its 1-based row number and reason.
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    pub row: usize,
    pub name: String,
    pub reason: String,
}

/// Aggregate outcome of a bulk import run.
///
/// Only committed chunks contribute to `created` and `updated`, so the
/// counts stay truthful when a run is cut short.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRecord>,
    pub chunks_committed: usize,
    /// True when the run stopped at a chunk boundary on cancellation.
    pub cancelled: bool,
}

/// Sort orders offered by the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Quantity,
    DateAdded,
}

/// Stock filters offered by the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFilter {
    #[default]
    All,
    LowStock,
    RecentlyAdded,
    Active,
    Inactive,
}
