//! The table-description repository seam.
//!
//! Persists virtual table schemas per tenant. The production implementation
//! lives elsewhere; [`InMemoryTableDescriptionRepo`] serves embedded use and
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::{TableDescription, TableSchema, TableStatus};

/// Black-box KV of `(tenant, virtual table name)` to schema.
#[async_trait]
pub trait TableDescriptionRepo: Send + Sync {
    async fn create_table(&self, tenant: &str, schema: TableSchema) -> Result<TableDescription>;
    async fn get_table_description(&self, tenant: &str, name: &str) -> Result<TableDescription>;
    async fn delete_table(&self, tenant: &str, name: &str) -> Result<TableDescription>;
}

/// A process-local description repo backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryTableDescriptionRepo {
    schemas: Mutex<HashMap<(String, String), TableSchema>>,
}

impl InMemoryTableDescriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableDescriptionRepo for InMemoryTableDescriptionRepo {
    async fn create_table(&self, tenant: &str, schema: TableSchema) -> Result<TableDescription> {
        let mut schemas = self.schemas.lock();
        let key = (tenant.to_string(), schema.name.clone());
        if schemas.contains_key(&key) {
            return Err(Error::InvalidArgument(format!(
                "table '{}' already exists",
                schema.name
            )));
        }
        schemas.insert(key, schema.clone());
        Ok(TableDescription {
            schema,
            status: TableStatus::Active,
            latest_stream_arn: None,
        })
    }

    async fn get_table_description(&self, tenant: &str, name: &str) -> Result<TableDescription> {
        let schemas = self.schemas.lock();
        let schema = schemas
            .get(&(tenant.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok(TableDescription {
            schema,
            status: TableStatus::Active,
            latest_stream_arn: None,
        })
    }

    async fn delete_table(&self, tenant: &str, name: &str) -> Result<TableDescription> {
        let mut schemas = self.schemas.lock();
        let schema = schemas
            .remove(&(tenant.to_string(), name.to_string()))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok(TableDescription {
            schema,
            status: TableStatus::Deleting,
            latest_stream_arn: None,
        })
    }
}
