//! services/api/src/adapters/store.rs
//!
//! This module contains the document-store adapter, which is the concrete
//! implementation of the `DocumentStore` port from the `core` crate. It maps
//! the (collection, document-id, fields) contract onto a single PostgreSQL
//! table with a JSONB fields column, using `sqlx`.
//!
//! Queries are built at runtime rather than with the `query!` macros so the
//! crate compiles without a live `DATABASE_URL`.

use async_trait::async_trait;
use inventory_core::ports::{DocumentStore, PortError, PortResult, StoreBatch, VersionedDoc};
use serde_json::Value;
use sqlx::PgPool;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store backed by one PostgreSQL table.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn read_err(e: sqlx::Error) -> PortError {
    PortError::StoreRead(e.to_string())
}

fn write_err(e: sqlx::Error) -> PortError {
    PortError::StoreWrite(e.to_string())
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<VersionedDoc>> {
        let row: Option<(Value, i64)> = sqlx::query_as(
            "SELECT fields, version FROM documents WHERE collection = $1 AND doc_id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(row.map(|(fields, version)| VersionedDoc {
            fields,
            version: version as u64,
        }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Value, merge: bool) -> PortResult<()> {
        // JSONB `||` overlays only the named top-level fields; the plain
        // assignment replaces the document wholesale.
        let sql = if merge {
            "INSERT INTO documents (collection, doc_id, fields) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, doc_id) DO UPDATE \
             SET fields = documents.fields || EXCLUDED.fields, version = documents.version + 1"
        } else {
            "INSERT INTO documents (collection, doc_id, fields) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, doc_id) DO UPDATE \
             SET fields = EXCLUDED.fields, version = documents.version + 1"
        };
        sqlx::query(sql)
            .bind(collection)
            .bind(id)
            .bind(fields)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
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
        let result = match expected {
            // Create-only: a concurrent creator wins the ON CONFLICT race
            // and this call reports the conflict instead of clobbering.
            None => sqlx::query(
                "INSERT INTO documents (collection, doc_id, fields) VALUES ($1, $2, $3) \
                 ON CONFLICT (collection, doc_id) DO NOTHING",
            )
            .bind(collection)
            .bind(id)
            .bind(fields)
            .execute(&self.pool)
            .await
            .map_err(write_err)?,
            Some(version) => {
                let sql = if merge {
                    "UPDATE documents SET fields = fields || $3, version = version + 1 \
                     WHERE collection = $1 AND doc_id = $2 AND version = $4"
                } else {
                    "UPDATE documents SET fields = $3, version = version + 1 \
                     WHERE collection = $1 AND doc_id = $2 AND version = $4"
                };
                sqlx::query(sql)
                    .bind(collection)
                    .bind(id)
                    .bind(fields)
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(write_err)?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND doc_id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn list_all(&self, collection: &str) -> PortResult<Vec<(String, Value)>> {
        sqlx::query_as("SELECT doc_id, fields FROM documents WHERE collection = $1")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)
    }

    fn batch(&self) -> Box<dyn StoreBatch> {
        Box::new(PgBatch {
            pool: self.pool.clone(),
            ops: Vec::new(),
        })
    }
}

//=========================================================================================
// Atomic Batches
//=========================================================================================

enum BatchOp {
    Set {
        collection: String,
        id: String,
        fields: Value,
    },
    Update {
        collection: String,
        id: String,
        fields: Value,
    },
}

/// Queued operations applied inside one transaction: the whole batch
/// commits or none of it does.
struct PgBatch {
    pool: PgPool,
    ops: Vec<BatchOp>,
}

#[async_trait]
impl StoreBatch for PgBatch {
    fn queue_set(&mut self, collection: &str, id: &str, fields: Value) {
        self.ops.push(BatchOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
    }

    fn queue_update(&mut self, collection: &str, id: &str, fields: Value) {
        self.ops.push(BatchOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for op in &self.ops {
            match op {
                BatchOp::Set {
                    collection,
                    id,
                    fields,
                } => {
                    sqlx::query(
                        "INSERT INTO documents (collection, doc_id, fields) VALUES ($1, $2, $3) \
                         ON CONFLICT (collection, doc_id) DO UPDATE \
                         SET fields = EXCLUDED.fields, version = documents.version + 1",
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(fields)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_err)?;
                }
                BatchOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let result = sqlx::query(
                        "UPDATE documents SET fields = fields || $3, version = version + 1 \
                         WHERE collection = $1 AND doc_id = $2",
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(fields)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_err)?;
                    if result.rows_affected() == 0 {
                        // Rolls back the whole batch on drop.
                        return Err(PortError::StoreWrite(format!(
                            "update of missing document '{}/{}'",
                            collection, id
                        )));
                    }
                }
            }
        }
        tx.commit().await.map_err(write_err)?;
        Ok(())
    }
}
