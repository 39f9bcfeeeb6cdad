//! Postgres-backed relational store and schema introspection.
//!
//! Every entity type maps to a table of the same name with an `id` primary
//! key; foreign-key columns are named after the relation fields. Identifiers
//! are quoted so mixed-case names survive. Ids travel as text and are cast to
//! the column type recorded at introspection, so uuid, integer and text keys
//! all work and foreign-key indexes stay usable.

mod schema;
mod store;
mod util;

pub use util::map_sqlx_error;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{RepoError, StoreHealth};
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::db";

/// `(table, column)` to the column's Postgres type name.
type ColumnTypes = HashMap<(String, String), String>;

#[derive(Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    soft_delete_column: Arc<str>,
    column_types: Arc<RwLock<ColumnTypes>>,
}

impl PostgresStore {
    pub fn new(pool: PgPool, soft_delete_column: impl Into<Arc<str>>) -> Self {
        Self {
            pool: Arc::new(pool),
            soft_delete_column: soft_delete_column.into(),
            column_types: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn soft_delete_column(&self) -> &str {
        &self.soft_delete_column
    }

    /// Type recorded for `table.column` by the last introspection.
    pub(crate) fn column_type(&self, table: &str, column: &str) -> Option<String> {
        rw_read(&self.column_types, SOURCE, "column_type")
            .get(&(table.to_string(), column.to_string()))
            .cloned()
    }

    pub(crate) fn record_column_types(&self, types: ColumnTypes) {
        *rw_write(&self.column_types, SOURCE, "record_column_types") = types;
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn check_health(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
