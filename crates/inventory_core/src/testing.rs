//! crates/inventory_core/src/testing.rs
//!
//! In-memory implementations of the store port for tests, in this crate and
//! in downstream crates. Supports failure injection at the batch-commit
//! boundary so partial-failure semantics can be exercised without a real
//! database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{DocumentStore, PortError, PortResult, StoreBatch, VersionedDoc};

type DocKey = (String, String);

#[derive(Default)]
struct Inner {
    docs: Mutex<HashMap<DocKey, (Value, u64)>>,
    /// Total `commit` calls, including failed attempts.
    commit_attempts: AtomicUsize,
    /// Commits that actually applied.
    committed_batches: AtomicUsize,
    /// Fail the next N commit attempts, then recover (transient failure).
    fail_next_commits: AtomicUsize,
    /// Fail every commit attempt numbered >= this (persistent failure).
    fail_commits_from: Mutex<Option<usize>>,
    /// Lose the next N compare-and-swap writes, as if a concurrent writer
    /// got there first.
    contend_next_cas: AtomicUsize,
}

/// A `DocumentStore` held entirely in memory. Cloning yields another handle
/// to the same underlying state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` batch commits fail with a retryable `StoreWrite`.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.fail_next_commits.store(n, Ordering::SeqCst);
    }

    /// Makes every batch-commit attempt numbered `from` (1-based) onward
    /// fail, modeling a store outage partway through an import.
    pub fn fail_commits_from(&self, from: usize) {
        *self.inner.fail_commits_from.lock().unwrap() = Some(from);
    }

    /// Makes the next `n` version-checked writes lose to a simulated
    /// concurrent writer: the stored version is bumped and the write is
    /// reported as conflicted.
    pub fn contend_next_cas(&self, n: usize) {
        self.inner.contend_next_cas.store(n, Ordering::SeqCst);
    }

    /// Commit calls seen so far, failed attempts included.
    pub fn commit_attempts(&self) -> usize {
        self.inner.commit_attempts.load(Ordering::SeqCst)
    }

    /// Batches that committed successfully.
    pub fn committed_batches(&self) -> usize {
        self.inner.committed_batches.load(Ordering::SeqCst)
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

fn merge_fields(existing: &mut Value, incoming: Value) {
    match (existing.as_object_mut(), incoming) {
        (Some(obj), Value::Object(new)) => {
            for (k, v) in new {
                obj.insert(k, v);
            }
        }
        (_, incoming) => *existing = incoming,
    }
}

fn apply_set(docs: &mut HashMap<DocKey, (Value, u64)>, key: DocKey, fields: Value, merge: bool) {
    match docs.get_mut(&key) {
        Some((existing, version)) if merge => {
            merge_fields(existing, fields);
            *version += 1;
        }
        Some(slot) => {
            *slot = (fields, slot.1 + 1);
        }
        None => {
            docs.insert(key, (fields, 1));
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<VersionedDoc>> {
        let docs = self.inner.docs.lock().unwrap();
        Ok(docs
            .get(&(collection.to_string(), id.to_string()))
            .map(|(fields, version)| VersionedDoc {
                fields: fields.clone(),
                version: *version,
            }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Value, merge: bool) -> PortResult<()> {
        let mut docs = self.inner.docs.lock().unwrap();
        apply_set(
            &mut docs,
            (collection.to_string(), id.to_string()),
            fields,
            merge,
        );
        Ok(())
    }

    async fn set_if_version(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        merge: bool,
        expected: Option<u64>,
    ) -> PortResult<bool> {
        let mut docs = self.inner.docs.lock().unwrap();
        let key = (collection.to_string(), id.to_string());
        let contended = self.inner.contend_next_cas.load(Ordering::SeqCst);
        if contended > 0 {
            self.inner
                .contend_next_cas
                .store(contended - 1, Ordering::SeqCst);
            if let Some((_, version)) = docs.get_mut(&key) {
                *version += 1;
            }
            return Ok(false);
        }
        let current = docs.get(&key).map(|(_, v)| *v);
        if current != expected {
            return Ok(false);
        }
        apply_set(&mut docs, key, fields, merge);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        let mut docs = self.inner.docs.lock().unwrap();
        docs.remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }

    async fn list_all(&self, collection: &str) -> PortResult<Vec<(String, Value)>> {
        let docs = self.inner.docs.lock().unwrap();
        let mut out: Vec<(String, Value)> = docs
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), (fields, _))| (id.clone(), fields.clone()))
            .collect();
        // HashMap iteration order is arbitrary; a deterministic order keeps
        // tests reproducible and is still "store-native" to this store.
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn batch(&self) -> Box<dyn StoreBatch> {
        Box::new(InMemoryBatch {
            store: self.clone(),
            ops: Vec::new(),
        })
    }
}

enum QueuedOp {
    Set(DocKey, Value),
    Update(DocKey, Value),
}

struct InMemoryBatch {
    store: InMemoryStore,
    ops: Vec<QueuedOp>,
}

#[async_trait]
impl StoreBatch for InMemoryBatch {
    fn queue_set(&mut self, collection: &str, id: &str, fields: Value) {
        self.ops.push(QueuedOp::Set(
            (collection.to_string(), id.to_string()),
            fields,
        ));
    }

    fn queue_update(&mut self, collection: &str, id: &str, fields: Value) {
        self.ops.push(QueuedOp::Update(
            (collection.to_string(), id.to_string()),
            fields,
        ));
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let inner = &self.store.inner;
        let attempt = inner.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(from) = *inner.fail_commits_from.lock().unwrap() {
            if attempt >= from {
                return Err(PortError::StoreWrite(format!(
                    "injected failure on commit attempt {}",
                    attempt
                )));
            }
        }
        let remaining = inner.fail_next_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            inner.fail_next_commits.store(remaining - 1, Ordering::SeqCst);
            return Err(PortError::StoreWrite(format!(
                "injected transient failure on commit attempt {}",
                attempt
            )));
        }

        // Apply against a scratch copy and swap, so a bad operation can
        // never leave half of the batch applied.
        let mut docs = inner.docs.lock().unwrap();
        let mut scratch = docs.clone();
        for op in self.ops {
            match op {
                QueuedOp::Set(key, fields) => apply_set(&mut scratch, key, fields, false),
                QueuedOp::Update(key, fields) => {
                    if !scratch.contains_key(&key) {
                        return Err(PortError::StoreWrite(format!(
                            "update of missing document '{}/{}'",
                            key.0, key.1
                        )));
                    }
                    apply_set(&mut scratch, key, fields, true);
                }
            }
        }
        *docs = scratch;
        inner.committed_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
