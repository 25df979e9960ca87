//! crates/inventory_core/src/repository.rs
//!
//! The Item Repository: owns the per-user item collection and its
//! upsert/soft-delete lifecycle. All state lives in the document store; the
//! repository itself is stateless between calls and consults its
//! `IdentityProvider` on every operation.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{Item, ItemStatus, User};
use crate::ports::{DocumentStore, IdentityProvider, PortError, PortResult};

/// How many times a read-modify-write cycle is retried when the
/// compare-and-swap write loses to a concurrent update.
const CAS_ATTEMPTS: usize = 5;

/// Lowercase-normalizes an item name. Applied identically on every write and
/// lookup path; a divergence here silently fragments the collection.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The store collection holding one user's inventory.
pub(crate) fn inventory_collection(uid: Uuid) -> String {
    format!("users/{}/inventory", uid)
}

/// Decodes a stored document into an [`Item`], taking the document id as the
/// authoritative name.
pub(crate) fn decode_item(id: &str, fields: Value) -> PortResult<Item> {
    let mut item: Item = serde_json::from_value(fields)
        .map_err(|e| PortError::StoreRead(format!("malformed item document '{}': {}", id, e)))?;
    item.name = id.to_string();
    Ok(item)
}

//=========================================================================================
// The Repository
//=========================================================================================

/// Per-user item collection operations: `add_item`, `remove_item`,
/// `remove_one`, `fetch_all`.
///
/// Both collaborators are injected, so tests can run against an in-memory
/// store and a pinned identity.
#[derive(Clone)]
pub struct ItemRepository {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl ItemRepository {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    async fn require_user(&self) -> PortResult<User> {
        self.identity
            .current_user()
            .await?
            .ok_or(PortError::NotAuthenticated)
    }

    /// Adds `quantity` units of `name`, creating the item on first sight.
    ///
    /// An existing active item accumulates; an inactive item is reactivated
    /// with its displayed quantity reset to the new delta (not added to the
    /// stale zero) and a fresh `dateAdded`. `totalReceived` accumulates
    /// across the item's whole lifetime.
    pub async fn add_item(&self, name: &str, quantity: u32) -> PortResult<()> {
        if quantity == 0 {
            return Err(PortError::InvalidRecord(
                "quantity must be positive".to_string(),
            ));
        }
        let id = normalize_name(name);
        if id.is_empty() {
            return Err(PortError::InvalidRecord(
                "item name must not be empty".to_string(),
            ));
        }
        let user = self.require_user().await?;
        let collection = inventory_collection(user.user_id);

        for _ in 0..CAS_ATTEMPTS {
            match self.store.get(&collection, &id).await? {
                None => {
                    let item = Item {
                        name: id.clone(),
                        quantity,
                        status: ItemStatus::Active,
                        date_added: Some(Utc::now()),
                        total_received: u64::from(quantity),
                    };
                    let fields = serde_json::to_value(&item)
                        .map_err(|e| PortError::StoreWrite(e.to_string()))?;
                    // Create-only write: loses to a concurrent creator.
                    if self
                        .store
                        .set_if_version(&collection, &id, fields, false, None)
                        .await?
                    {
                        return Ok(());
                    }
                }
                Some(doc) => {
                    let item = decode_item(&id, doc.fields)?;
                    let fields = match item.status {
                        ItemStatus::Active => {
                            let total = item.quantity.checked_add(quantity).ok_or_else(|| {
                                PortError::InvalidRecord(format!(
                                    "quantity for '{}' would exceed {}",
                                    id,
                                    u32::MAX
                                ))
                            })?;
                            json!({
                                "quantity": total,
                                "totalReceived":
                                    item.total_received.saturating_add(u64::from(quantity)),
                            })
                        }
                        ItemStatus::Inactive => json!({
                            "quantity": quantity,
                            "status": ItemStatus::Active,
                            "dateAdded": Utc::now(),
                            "totalReceived":
                                item.total_received.saturating_add(u64::from(quantity)),
                        }),
                    };
                    if self
                        .store
                        .set_if_version(&collection, &id, fields, true, Some(doc.version))
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
            // Lost the race; re-read and try again.
        }
        Err(PortError::StoreWrite(format!(
            "gave up writing '{}' after {} concurrent-update conflicts",
            id, CAS_ATTEMPTS
        )))
    }

    /// Removes `quantity` units of `name`. Removing the last unit flips the
    /// item to inactive with zero stock instead of deleting the document.
    /// Fails with `InsufficientStock`, without touching the document, when
    /// more is asked for than is held.
    pub async fn remove_item(&self, name: &str, quantity: u32) -> PortResult<()> {
        if quantity == 0 {
            return Err(PortError::InvalidRecord(
                "quantity must be positive".to_string(),
            ));
        }
        let id = normalize_name(name);
        let user = self.require_user().await?;
        let collection = inventory_collection(user.user_id);

        for _ in 0..CAS_ATTEMPTS {
            let doc = self
                .store
                .get(&collection, &id)
                .await?
                .ok_or_else(|| PortError::NotFound(id.clone()))?;
            let item = decode_item(&id, doc.fields)?;

            if quantity > item.quantity {
                return Err(PortError::InsufficientStock {
                    available: item.quantity,
                    requested: quantity,
                });
            }
            let remaining = item.quantity - quantity;
            let fields = if remaining > 0 {
                json!({ "quantity": remaining })
            } else {
                json!({ "quantity": 0, "status": ItemStatus::Inactive })
            };
            if self
                .store
                .set_if_version(&collection, &id, fields, true, Some(doc.version))
                .await?
            {
                return Ok(());
            }
        }
        Err(PortError::StoreWrite(format!(
            "gave up writing '{}' after {} concurrent-update conflicts",
            id, CAS_ATTEMPTS
        )))
    }

    /// Convenience form of [`remove_item`](Self::remove_item) for a single
    /// unit, with the same zero-floor behavior.
    pub async fn remove_one(&self, name: &str) -> PortResult<()> {
        self.remove_item(name, 1).await
    }

    /// Every item in the current user's scope, in store-native order.
    /// Sorting and filtering are presentation concerns (see
    /// [`crate::views`]).
    pub async fn fetch_all(&self) -> PortResult<Vec<Item>> {
        let user = self.require_user().await?;
        let collection = inventory_collection(user.user_id);
        self.store
            .list_all(&collection)
            .await?
            .into_iter()
            .map(|(id, fields)| decode_item(&id, fields))
            .collect()
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedIdentity;
    use crate::testing::InMemoryStore;
    use std::collections::HashMap;

    fn test_user() -> User {
        User {
            user_id: Uuid::new_v4(),
            email: Some("owner@example.com".to_string()),
        }
    }

    fn repo_for(store: &InMemoryStore, user: User) -> ItemRepository {
        ItemRepository::new(
            Arc::new(store.clone()),
            Arc::new(FixedIdentity::user(user)),
        )
    }

    async fn item(repo: &ItemRepository, name: &str) -> Item {
        repo.fetch_all()
            .await
            .unwrap()
            .into_iter()
            .find(|i| i.name == name)
            .expect("item should exist")
    }

    #[tokio::test]
    async fn sequential_adds_accumulate_quantity_and_total_received() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("widget", 3).await.unwrap();
        repo.add_item("widget", 4).await.unwrap();

        let item = item(&repo, "widget").await;
        assert_eq!(item.quantity, 7);
        assert_eq!(item.total_received, 7);
        assert_eq!(item.status, ItemStatus::Active);
        assert!(item.date_added.is_some());
    }

    #[tokio::test]
    async fn name_lookups_are_case_insensitive() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("Pen", 10).await.unwrap();
        repo.add_item("pen", 5).await.unwrap();
        repo.remove_item("PEN", 12).await.unwrap();

        let items = repo.fetch_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "pen");
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].status, ItemStatus::Active);
    }

    #[tokio::test]
    async fn removing_everything_soft_deletes_instead_of_dropping_the_document() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("Paper", 2).await.unwrap();
        repo.remove_item("paper", 2).await.unwrap();

        let item = item(&repo, "paper").await;
        assert_eq!(item.quantity, 0);
        assert_eq!(item.status, ItemStatus::Inactive);
    }

    #[tokio::test]
    async fn over_removal_fails_and_leaves_the_document_unchanged() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("tape", 4).await.unwrap();
        let before = item(&repo, "tape").await;

        let err = repo.remove_item("tape", 5).await.unwrap_err();
        assert!(matches!(
            err,
            PortError::InsufficientStock {
                available: 4,
                requested: 5
            }
        ));

        let after = item(&repo, "tape").await;
        assert_eq!(after.quantity, before.quantity);
        assert_eq!(after.status, before.status);
        assert_eq!(after.date_added, before.date_added);
    }

    #[tokio::test]
    async fn reactivation_resets_quantity_and_date_but_keeps_total_received() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("glue", 5).await.unwrap();
        let first_added = item(&repo, "glue").await.date_added.unwrap();
        repo.remove_item("glue", 5).await.unwrap();

        repo.add_item("glue", 3).await.unwrap();
        let revived = item(&repo, "glue").await;
        assert_eq!(revived.quantity, 3);
        assert_eq!(revived.status, ItemStatus::Active);
        assert_eq!(revived.total_received, 8);
        assert!(revived.date_added.unwrap() >= first_added);
    }

    #[tokio::test]
    async fn single_unit_convenience_form_hits_the_zero_floor() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("stamp", 1).await.unwrap();
        repo.remove_one("stamp").await.unwrap();

        let item = item(&repo, "stamp").await;
        assert_eq!(item.quantity, 0);
        assert_eq!(item.status, ItemStatus::Inactive);
    }

    #[tokio::test]
    async fn operations_require_an_authenticated_user() {
        let store = InMemoryStore::new();
        let repo = ItemRepository::new(
            Arc::new(store),
            Arc::new(FixedIdentity::anonymous()),
        );

        assert!(matches!(
            repo.add_item("pen", 1).await,
            Err(PortError::NotAuthenticated)
        ));
        assert!(matches!(
            repo.remove_item("pen", 1).await,
            Err(PortError::NotAuthenticated)
        ));
        assert!(matches!(
            repo.fetch_all().await,
            Err(PortError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn removing_an_unknown_item_is_not_found() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        let err = repo.remove_item("ghost", 1).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_up_front() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        assert!(matches!(
            repo.add_item("pen", 0).await,
            Err(PortError::InvalidRecord(_))
        ));
        assert!(matches!(
            repo.add_item("   ", 1).await,
            Err(PortError::InvalidRecord(_))
        ));
        assert!(matches!(
            repo.remove_item("pen", 0).await,
            Err(PortError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn a_lost_version_checked_write_is_re_read_and_retried() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("pen", 2).await.unwrap();
        store.contend_next_cas(1);
        repo.add_item("pen", 3).await.unwrap();

        assert_eq!(item(&repo, "pen").await.quantity, 5);
    }

    #[tokio::test]
    async fn exhausting_the_conflict_retry_budget_surfaces_a_store_error() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("pen", 2).await.unwrap();
        store.contend_next_cas(CAS_ATTEMPTS);
        let err = repo.add_item("pen", 3).await.unwrap_err();
        assert!(matches!(err, PortError::StoreWrite(_)));

        // The contended add wrote nothing.
        assert_eq!(item(&repo, "pen").await.quantity, 2);
    }

    #[tokio::test]
    async fn adding_past_the_quantity_ceiling_is_rejected_without_wrapping() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        repo.add_item("bolt", u32::MAX).await.unwrap();
        let err = repo.add_item("bolt", 1).await.unwrap_err();
        assert!(matches!(err, PortError::InvalidRecord(_)));

        let bolt = item(&repo, "bolt").await;
        assert_eq!(bolt.quantity, u32::MAX);
    }

    #[tokio::test]
    async fn users_do_not_see_each_others_inventory() {
        let store = InMemoryStore::new();
        let alice = repo_for(&store, test_user());
        let bob = repo_for(&store, test_user());

        alice.add_item("pen", 2).await.unwrap();
        assert!(bob.fetch_all().await.unwrap().is_empty());
    }

    /// Replays a mixed operation sequence against both the repository and a
    /// plain in-memory reference, then checks the quantities agree.
    #[tokio::test]
    async fn fetch_all_matches_a_reference_simulation() {
        let store = InMemoryStore::new();
        let repo = repo_for(&store, test_user());

        let ops: &[(&str, &str, u32)] = &[
            ("add", "Pen", 10),
            ("add", "Notebook", 2),
            ("add", "pen", 5),
            ("remove", "PEN", 12),
            ("add", "eraser", 1),
            ("remove", "eraser", 1),
            ("add", "notebook", 3),
        ];

        let mut reference: HashMap<String, u32> = HashMap::new();
        for (op, name, qty) in ops {
            let key = normalize_name(name);
            match *op {
                "add" => {
                    repo.add_item(name, *qty).await.unwrap();
                    *reference.entry(key).or_insert(0) += qty;
                }
                "remove" => {
                    repo.remove_item(name, *qty).await.unwrap();
                    *reference.get_mut(&key).unwrap() -= qty;
                }
                _ => unreachable!(),
            }
        }

        let fetched: HashMap<String, u32> = repo
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.name, i.quantity))
            .collect();
        assert_eq!(fetched, reference);
    }
}
