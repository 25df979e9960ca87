//! crates/inventory_core/src/importer.rs
//!
//! The Batch Importer: applies a decoded sequence of `{name, quantity}`
//! records against the item collection using the store's atomic batches,
//! chunked to the store's 500-operation ceiling. Chunks commit strictly in
//! sequence; an earlier chunk's success is never rolled back when a later
//! chunk fails, which is the intended partial-failure boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{ImportReport, Item, ItemStatus, RawRecord, SkippedRecord};
use crate::ports::{DocumentStore, IdentityProvider, PortError, MAX_BATCH_OPS};
use crate::repository::{decode_item, inventory_collection, normalize_name};

/// A bulk import that could not run to completion. Chunks committed before
/// the failure stay applied; `report` counts exactly what persisted.
#[derive(Debug, thiserror::Error)]
#[error("import aborted after {} committed chunk(s): {source}", .report.chunks_committed)]
pub struct ImportError {
    pub report: ImportReport,
    #[source]
    pub source: PortError,
}

/// The effective state of one document as of the operations queued so far
/// in this run. Later records for the same name build on this instead of a
/// stale store read.
#[derive(Clone)]
struct PendingState {
    exists: bool,
    quantity: u32,
    status: ItemStatus,
    total_received: u64,
}

enum ChunkOp {
    Set(String, Value),
    Update(String, Value),
}

//=========================================================================================
// The Importer
//=========================================================================================

pub struct BatchImporter {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    chunk_size: usize,
    commit_attempts: u32,
    backoff_base: Duration,
    commit_timeout: Duration,
    cancel: CancellationToken,
}

impl BatchImporter {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            chunk_size: MAX_BATCH_OPS,
            commit_attempts: 3,
            backoff_base: Duration::from_millis(250),
            commit_timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the chunk size, clamped to the store's hard ceiling.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(1, MAX_BATCH_OPS);
        self
    }

    /// Overrides the per-chunk commit retry budget and backoff base.
    pub fn with_commit_retry(mut self, attempts: u32, backoff_base: Duration) -> Self {
        self.commit_attempts = attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Installs a cancellation token, honored between chunks only.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the import. Individual invalid records are skipped and counted,
    /// never aborting the run; identity, read, and commit failures abort it
    /// with everything already committed reflected in the error's report.
    pub async fn import(&self, records: Vec<RawRecord>) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();

        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(ImportError {
                    report,
                    source: PortError::NotAuthenticated,
                })
            }
            Err(source) => return Err(ImportError { report, source }),
        };
        let collection = inventory_collection(user.user_id);

        let mut seen: HashMap<String, PendingState> = HashMap::new();
        let mut ops: Vec<ChunkOp> = Vec::new();
        let mut pending_created = 0usize;
        let mut pending_updated = 0usize;
        let total = records.len();

        for (index, record) in records.into_iter().enumerate() {
            let row = index + 1;
            let id = normalize_name(&record.name);
            if id.is_empty() {
                report.skipped.push(SkippedRecord {
                    row,
                    name: record.name,
                    reason: "empty name".to_string(),
                });
                continue;
            }
            let quantity = match record.quantity.trim().parse::<i64>() {
                Ok(q) if q > 0 && q <= i64::from(u32::MAX) => q as u32,
                Ok(_) => {
                    report.skipped.push(SkippedRecord {
                        row,
                        name: record.name,
                        reason: format!("non-positive quantity '{}'", record.quantity),
                    });
                    continue;
                }
                Err(_) => {
                    report.skipped.push(SkippedRecord {
                        row,
                        name: record.name,
                        reason: format!("non-numeric quantity '{}'", record.quantity),
                    });
                    continue;
                }
            };

            let state = match seen.get(&id) {
                Some(state) => state.clone(),
                None => match self.lookup(&collection, &id).await {
                    Ok(state) => state,
                    Err(source) => return Err(ImportError { report, source }),
                },
            };

            let next = if !state.exists {
                let item = Item {
                    name: id.clone(),
                    quantity,
                    status: ItemStatus::Active,
                    date_added: Some(Utc::now()),
                    total_received: u64::from(quantity),
                };
                let fields = match serde_json::to_value(&item) {
                    Ok(fields) => fields,
                    Err(e) => {
                        return Err(ImportError {
                            report,
                            source: PortError::StoreWrite(e.to_string()),
                        })
                    }
                };
                ops.push(ChunkOp::Set(id.clone(), fields));
                pending_created += 1;
                PendingState {
                    exists: true,
                    quantity,
                    status: ItemStatus::Active,
                    total_received: u64::from(quantity),
                }
            } else if state.status == ItemStatus::Active {
                let new_quantity = match state.quantity.checked_add(quantity) {
                    Some(q) => q,
                    None => {
                        report.skipped.push(SkippedRecord {
                            row,
                            name: record.name,
                            reason: format!("quantity would exceed {}", u32::MAX),
                        });
                        continue;
                    }
                };
                let new_total = state.total_received.saturating_add(u64::from(quantity));
                ops.push(ChunkOp::Update(
                    id.clone(),
                    json!({ "quantity": new_quantity, "totalReceived": new_total }),
                ));
                pending_updated += 1;
                PendingState {
                    exists: true,
                    quantity: new_quantity,
                    status: ItemStatus::Active,
                    total_received: new_total,
                }
            } else {
                // Reactivation: same rule as a single-item add.
                let new_total = state.total_received.saturating_add(u64::from(quantity));
                ops.push(ChunkOp::Update(
                    id.clone(),
                    json!({
                        "quantity": quantity,
                        "status": ItemStatus::Active,
                        "dateAdded": Utc::now(),
                        "totalReceived": new_total,
                    }),
                ));
                pending_updated += 1;
                PendingState {
                    exists: true,
                    quantity,
                    status: ItemStatus::Active,
                    total_received: new_total,
                }
            };
            seen.insert(id, next);

            if ops.len() >= self.chunk_size {
                if let Err(source) = self.commit_chunk(&collection, &ops).await {
                    return Err(ImportError { report, source });
                }
                report.chunks_committed += 1;
                report.created += pending_created;
                report.updated += pending_updated;
                pending_created = 0;
                pending_updated = 0;
                ops.clear();

                if self.cancel.is_cancelled() && row < total {
                    debug!(processed = row, total, "import cancelled between chunks");
                    report.cancelled = true;
                    return Ok(report);
                }
            }
        }

        if !ops.is_empty() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            if let Err(source) = self.commit_chunk(&collection, &ops).await {
                return Err(ImportError { report, source });
            }
            report.chunks_committed += 1;
            report.created += pending_created;
            report.updated += pending_updated;
        }

        Ok(report)
    }

    async fn lookup(&self, collection: &str, id: &str) -> Result<PendingState, PortError> {
        match self.store.get(collection, id).await? {
            Some(doc) => {
                let item = decode_item(id, doc.fields)?;
                Ok(PendingState {
                    exists: true,
                    quantity: item.quantity,
                    status: item.status,
                    total_received: item.total_received,
                })
            }
            None => Ok(PendingState {
                exists: false,
                quantity: 0,
                status: ItemStatus::Active,
                total_received: 0,
            }),
        }
    }

    /// Commits one chunk atomically, retrying transient write failures with
    /// bounded exponential backoff. Each attempt rebuilds the batch, since a
    /// batch is consumed by its commit.
    async fn commit_chunk(&self, collection: &str, ops: &[ChunkOp]) -> Result<(), PortError> {
        let mut delay = self.backoff_base;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut batch = self.store.batch();
            for op in ops {
                match op {
                    ChunkOp::Set(id, fields) => batch.queue_set(collection, id, fields.clone()),
                    ChunkOp::Update(id, fields) => {
                        batch.queue_update(collection, id, fields.clone())
                    }
                }
            }
            let result = match tokio::time::timeout(self.commit_timeout, batch.commit()).await {
                Ok(result) => result,
                Err(_) => Err(PortError::StoreWrite(format!(
                    "chunk commit timed out after {:?}",
                    self.commit_timeout
                ))),
            };
            match result {
                Ok(()) => {
                    debug!(ops = ops.len(), attempt, "chunk committed");
                    return Ok(());
                }
                Err(PortError::StoreWrite(msg)) if attempt < self.commit_attempts => {
                    warn!(attempt, error = %msg, "chunk commit failed, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedIdentity;
    use crate::repository::ItemRepository;
    use crate::testing::InMemoryStore;
    use crate::domain::User;
    use uuid::Uuid;

    fn test_user() -> User {
        User {
            user_id: Uuid::new_v4(),
            email: None,
        }
    }

    fn importer_for(store: &InMemoryStore, user: &User) -> BatchImporter {
        BatchImporter::new(
            Arc::new(store.clone()),
            Arc::new(FixedIdentity::user(user.clone())),
        )
        .with_commit_retry(1, Duration::from_millis(1))
    }

    fn records(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| RawRecord {
                name: format!("item-{:04}", i),
                quantity: "1".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn large_imports_commit_in_chunks_of_five_hundred() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = importer_for(&store, &user);

        let report = importer.import(records(1101)).await.unwrap();

        assert_eq!(report.created, 1101);
        assert_eq!(report.updated, 0);
        assert_eq!(report.chunks_committed, 3); // ceil(1101 / 500)
        assert_eq!(store.committed_batches(), 3);
        assert_eq!(
            store.document_count(&inventory_collection(user.user_id)),
            1101
        );
    }

    #[tokio::test]
    async fn commit_failure_keeps_earlier_chunks_and_reports_them() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = importer_for(&store, &user);
        store.fail_commits_from(2);

        let err = importer.import(records(1200)).await.unwrap_err();

        assert!(matches!(err.source, PortError::StoreWrite(_)));
        assert_eq!(err.report.chunks_committed, 1);
        assert_eq!(err.report.created, 500);
        // Exactly the first chunk persisted; nothing from later chunks.
        assert_eq!(
            store.document_count(&inventory_collection(user.user_id)),
            500
        );
    }

    #[tokio::test]
    async fn transient_commit_failures_are_retried_with_backoff() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = BatchImporter::new(
            Arc::new(store.clone()),
            Arc::new(FixedIdentity::user(user.clone())),
        )
        .with_commit_retry(3, Duration::from_millis(1));
        store.fail_next_commits(2);

        let report = importer.import(records(10)).await.unwrap();

        assert_eq!(report.created, 10);
        assert_eq!(report.chunks_committed, 1);
        assert_eq!(store.commit_attempts(), 3);
        assert_eq!(store.committed_batches(), 1);
    }

    #[tokio::test]
    async fn invalid_records_are_skipped_without_aborting_the_run() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = importer_for(&store, &user);

        let report = importer
            .import(vec![
                RawRecord {
                    name: "Pen".into(),
                    quantity: "10".into(),
                },
                RawRecord {
                    name: "".into(),
                    quantity: "3".into(),
                },
                RawRecord {
                    name: "tape".into(),
                    quantity: "lots".into(),
                },
                RawRecord {
                    name: "glue".into(),
                    quantity: "0".into(),
                },
                RawRecord {
                    name: "Paper".into(),
                    quantity: " 4 ".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(
            report
                .skipped
                .iter()
                .map(|s| s.row)
                .collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[tokio::test]
    async fn repeated_names_in_one_file_accumulate_into_one_document() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = importer_for(&store, &user);

        let report = importer
            .import(vec![
                RawRecord {
                    name: "Widget".into(),
                    quantity: "2".into(),
                },
                RawRecord {
                    name: "widget".into(),
                    quantity: "3".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);

        let repo = ItemRepository::new(
            Arc::new(store),
            Arc::new(FixedIdentity::user(user)),
        );
        let items = repo.fetch_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
        assert_eq!(items[0].total_received, 5);
    }

    #[tokio::test]
    async fn records_that_would_overflow_the_quantity_are_skipped() {
        let store = InMemoryStore::new();
        let user = test_user();
        let importer = importer_for(&store, &user);

        let report = importer
            .import(vec![
                RawRecord {
                    name: "bolt".into(),
                    quantity: u32::MAX.to_string(),
                },
                RawRecord {
                    name: "Bolt".into(),
                    quantity: "1".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].row, 2);

        let repo = ItemRepository::new(
            Arc::new(store),
            Arc::new(FixedIdentity::user(user)),
        );
        let items = repo.fetch_all().await.unwrap();
        assert_eq!(items[0].quantity, u32::MAX);
    }

    #[tokio::test]
    async fn existing_items_get_additive_updates_and_inactive_ones_reactivate() {
        let store = InMemoryStore::new();
        let user = test_user();
        let repo = ItemRepository::new(
            Arc::new(store.clone()),
            Arc::new(FixedIdentity::user(user.clone())),
        );
        repo.add_item("pen", 5).await.unwrap();
        repo.add_item("paper", 2).await.unwrap();
        repo.remove_item("paper", 2).await.unwrap(); // now inactive

        let importer = importer_for(&store, &user);
        let report = importer
            .import(vec![
                RawRecord {
                    name: "pen".into(),
                    quantity: "7".into(),
                },
                RawRecord {
                    name: "paper".into(),
                    quantity: "4".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 2);

        let items = repo.fetch_all().await.unwrap();
        let pen = items.iter().find(|i| i.name == "pen").unwrap();
        assert_eq!(pen.quantity, 12);
        assert_eq!(pen.total_received, 12);
        let paper = items.iter().find(|i| i.name == "paper").unwrap();
        assert_eq!(paper.quantity, 4);
        assert_eq!(paper.status, ItemStatus::Active);
        assert_eq!(paper.total_received, 6);
    }

    #[tokio::test]
    async fn cancellation_is_honored_at_chunk_boundaries() {
        let store = InMemoryStore::new();
        let user = test_user();
        let token = CancellationToken::new();
        token.cancel();
        let importer = importer_for(&store, &user)
            .with_chunk_size(2)
            .with_cancellation(token);

        let report = importer.import(records(5)).await.unwrap();

        // The first full chunk commits; the run stops at the boundary.
        assert!(report.cancelled);
        assert_eq!(report.chunks_committed, 1);
        assert_eq!(report.created, 2);
        assert_eq!(
            store.document_count(&inventory_collection(user.user_id)),
            2
        );
    }

    #[tokio::test]
    async fn import_requires_an_authenticated_user() {
        let store = InMemoryStore::new();
        let importer = BatchImporter::new(
            Arc::new(store.clone()),
            Arc::new(FixedIdentity::anonymous()),
        );

        let err = importer.import(records(3)).await.unwrap_err();
        assert!(matches!(err.source, PortError::NotAuthenticated));
        assert_eq!(err.report.chunks_committed, 0);
        assert_eq!(store.commit_attempts(), 0);
    }
}
