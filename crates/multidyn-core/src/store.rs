//! The backing store seam.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{
    BatchGetItemOutput, BatchGetItemRequest, DeleteItemOutput, DeleteItemRequest, GetItemOutput,
    GetItemRequest, PutItemOutput, PutItemRequest, QueryOutput, QueryRequest, ScanOutput,
    ScanRequest, UpdateItemOutput, UpdateItemRequest,
};
use crate::types::{TableDescription, TableSchema};

/// Client capability over the store the physical tables live in.
///
/// The layer drives only the data-plane surface; the control-plane methods
/// exist for completeness (physical tables are pre-provisioned) and default
/// to `Unsupported`.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get_item(&self, request: GetItemRequest) -> Result<GetItemOutput>;
    async fn put_item(&self, request: PutItemRequest) -> Result<PutItemOutput>;
    async fn update_item(&self, request: UpdateItemRequest) -> Result<UpdateItemOutput>;
    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput>;
    async fn batch_get_item(&self, request: BatchGetItemRequest) -> Result<BatchGetItemOutput>;
    async fn query(&self, request: QueryRequest) -> Result<QueryOutput>;
    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput>;

    async fn create_table(&self, _schema: TableSchema) -> Result<TableDescription> {
        Err(Error::Unsupported(
            "create_table is not routed through the backing store".to_string(),
        ))
    }

    async fn delete_table(&self, _table_name: String) -> Result<TableDescription> {
        Err(Error::Unsupported(
            "delete_table is not routed through the backing store".to_string(),
        ))
    }

    async fn describe_table(&self, _table_name: String) -> Result<TableDescription> {
        Err(Error::Unsupported(
            "describe_table is not routed through the backing store".to_string(),
        ))
    }
}
