//! The multitenant façade over the backing store.
//!
//! For each operation: validate unsupported options, resolve the table
//! mapping through the cache, rewrite the request to physical form, invoke
//! the backing store, and reverse-map the response. Scan additionally runs a
//! paging loop so pages that the tenant filter empties out do not masquerade
//! as end-of-stream.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::arn::StreamArn;
use crate::cache::MappingCache;
use crate::clock::{Clock, SystemClock};
use crate::context::TenantContextProvider;
use crate::error::{Error, Result};
use crate::mapper::prefix::{self, FieldValue};
use crate::mapper::wrapper::{DeleteRequestWrapper, PutRequestWrapper, UpdateRequestWrapper};
use crate::mapping::{PhysicalTableSet, TableMapping, TableMappingFactory};
use crate::repo::TableDescriptionRepo;
use crate::request::{
    BatchGetItemOutput, BatchGetItemRequest, DeleteItemOutput, DeleteItemRequest, GetItemOutput,
    GetItemRequest, KeysAndAttributes, PutItemOutput, PutItemRequest, QueryOutput, QueryRequest,
    ScanOutput, ScanRequest, UpdateItemOutput, UpdateItemRequest,
};
use crate::store::BackingStore;
use crate::types::{
    AttributeValue, Item, ScalarKind, TableDescription, TableSchema, TableStatus,
};

/// Default soft cap, in milliseconds, on the scan paging loop.
const DEFAULT_GET_RECORDS_TIME_LIMIT: u64 = 10_000;

/// Default bound on cached table mappings.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

struct DeleteJob {
    tenant: String,
    table: String,
}

struct Inner {
    name: String,
    store: Arc<dyn BackingStore>,
    repo: Arc<dyn TableDescriptionRepo>,
    context: Arc<dyn TenantContextProvider>,
    clock: Arc<dyn Clock>,
    physical_tables: Arc<PhysicalTableSet>,
    factory: TableMappingFactory,
    cache: MappingCache,
    delete_table_async: bool,
    truncate_on_delete_table: bool,
    get_records_time_limit: u64,
    delete_queue: Option<mpsc::UnboundedSender<DeleteJob>>,
}

/// The multitenant virtualization layer.
///
/// Cheaply clonable (`Arc`-based) and `Send + Sync`; every operation may be
/// invoked from any number of concurrent workers.
#[derive(Clone)]
pub struct MultidynDb {
    inner: Arc<Inner>,
}

impl fmt::Display for MultidynDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// Configuration builder for [`MultidynDb`].
pub struct MultidynDbBuilder {
    name: String,
    store: Arc<dyn BackingStore>,
    repo: Arc<dyn TableDescriptionRepo>,
    context: Arc<dyn TenantContextProvider>,
    physical_tables: Arc<PhysicalTableSet>,
    clock: Arc<dyn Clock>,
    delete_table_async: bool,
    truncate_on_delete_table: bool,
    get_records_time_limit: u64,
    cache_capacity: NonZeroUsize,
}

impl MultidynDbBuilder {
    /// Identifier used in diagnostic output only.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn physical_tables(mut self, tables: Arc<PhysicalTableSet>) -> Self {
        self.physical_tables = tables;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When true, `delete_table` returns immediately and truncation plus
    /// schema deletion run on the background worker.
    pub fn delete_table_async(mut self, enabled: bool) -> Self {
        self.delete_table_async = enabled;
        self
    }

    /// When false, `delete_table` leaves rows in the physical table,
    /// orphaned under the old prefix.
    pub fn truncate_on_delete_table(mut self, enabled: bool) -> Self {
        self.truncate_on_delete_table = enabled;
        self
    }

    /// Soft millisecond cap on the scan empty-page loop.
    pub fn get_records_time_limit(mut self, millis: u64) -> Self {
        self.get_records_time_limit = millis;
        self
    }

    pub fn cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build the layer.
    ///
    /// With `delete_table_async` enabled this spawns the durable delete
    /// worker and therefore must run inside a tokio runtime.
    pub fn build(self) -> MultidynDb {
        let (queue_tx, queue_rx) = if self.delete_table_async {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new(Inner {
            name: self.name,
            store: self.store,
            repo: self.repo,
            context: self.context,
            clock: self.clock,
            factory: TableMappingFactory::new(self.physical_tables.clone()),
            physical_tables: self.physical_tables,
            cache: MappingCache::new(self.cache_capacity),
            delete_table_async: self.delete_table_async,
            truncate_on_delete_table: self.truncate_on_delete_table,
            get_records_time_limit: self.get_records_time_limit,
            delete_queue: queue_tx,
        });

        if let Some(rx) = queue_rx {
            tokio::spawn(delete_worker(Arc::downgrade(&inner), rx));
        }

        MultidynDb { inner }
    }
}

/// One durable worker drains the delete queue for the lifetime of the
/// layer. Errors are logged and dropped; there is no retry.
async fn delete_worker(inner: Weak<Inner>, mut queue: mpsc::UnboundedReceiver<DeleteJob>) {
    while let Some(job) = queue.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let db = MultidynDb { inner };
        if let Err(e) = db.delete_table_internal(&job.tenant, &job.table).await {
            warn!(table = %job.table, error = %e, "asynchronous table delete failed");
        }
    }
}

/// Decodes the tenant, virtual table or index name, and original value out
/// of a physical key map. Lets shared-stream consumers demultiplex records.
#[derive(Debug, Clone)]
pub struct FieldValueDecoder {
    hash_name: String,
    hash_kind: ScalarKind,
}

impl FieldValueDecoder {
    pub fn decode(&self, physical_key: &Item) -> Result<FieldValue<AttributeValue>> {
        let value = physical_key.get(&self.hash_name).ok_or_else(|| {
            Error::InvalidArgument(format!("key is missing hash attribute '{}'", self.hash_name))
        })?;
        match self.hash_kind {
            ScalarKind::S => {
                let encoded = value.as_s().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "hash attribute '{}' is not a string",
                        self.hash_name
                    ))
                })?;
                let fv = prefix::reverse_string(encoded)?;
                Ok(FieldValue {
                    tenant: fv.tenant,
                    qualifier: fv.qualifier,
                    value: AttributeValue::S(fv.value),
                })
            }
            ScalarKind::B => {
                let encoded = value.as_b().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "hash attribute '{}' is not binary",
                        self.hash_name
                    ))
                })?;
                let fv = prefix::reverse_binary(encoded)?;
                Ok(FieldValue {
                    tenant: fv.tenant,
                    qualifier: fv.qualifier,
                    value: AttributeValue::B(fv.value),
                })
            }
            ScalarKind::N => Err(Error::Internal(format!(
                "physical hash key '{}' has numeric kind",
                self.hash_name
            ))),
        }
    }
}

impl MultidynDb {
    pub fn builder(
        store: Arc<dyn BackingStore>,
        repo: Arc<dyn TableDescriptionRepo>,
        context: Arc<dyn TenantContextProvider>,
    ) -> MultidynDbBuilder {
        MultidynDbBuilder {
            name: "multidyn".to_string(),
            store,
            repo,
            context,
            physical_tables: Arc::new(PhysicalTableSet::standard("mt_shared_")),
            clock: Arc::new(SystemClock),
            delete_table_async: false,
            truncate_on_delete_table: true,
            get_records_time_limit: DEFAULT_GET_RECORDS_TIME_LIMIT,
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Is `name` one of the fixed physical tables?
    pub fn is_physical_table(&self, name: &str) -> bool {
        self.inner.physical_tables.contains(name)
    }

    /// A decoder for physical keys of the named physical table.
    pub fn field_value_decoder(&self, physical_table: &str) -> Result<FieldValueDecoder> {
        let table = self.inner.physical_tables.get(physical_table).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown physical table '{physical_table}'"))
        })?;
        Ok(FieldValueDecoder {
            hash_name: table.primary_key.hash.name.clone(),
            hash_kind: table.primary_key.hash.kind,
        })
    }

    fn require_tenant(&self) -> Result<String> {
        self.inner
            .context
            .current_tenant()
            .ok_or_else(|| Error::InvalidArgument("no tenant context is set".to_string()))
    }

    async fn table_mapping(&self, tenant: &str, table: &str) -> Result<Arc<TableMapping>> {
        let repo = self.inner.repo.clone();
        let factory = self.inner.factory.clone();
        let tenant_owned = tenant.to_string();
        let table_owned = table.to_string();
        self.inner
            .cache
            .get_or_build(tenant, table, || async move {
                let description = repo
                    .get_table_description(&tenant_owned, &table_owned)
                    .await?;
                factory.table_mapping(&description.schema).map(Arc::new)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Item operations
    // -----------------------------------------------------------------------

    pub async fn get_item(&self, mut request: GetItemRequest) -> Result<GetItemOutput> {
        reject_option(request.consistent_read.is_some(), "consistent_read", "GetItem")?;
        reject_option(request.attributes_to_get.is_some(), "attributes_to_get", "GetItem")?;
        reject_option(
            request.projection_expression.is_some(),
            "projection_expression",
            "GetItem",
        )?;
        reject_option(
            request.expression_attribute_names.is_some(),
            "expression_attribute_names",
            "GetItem",
        )?;

        let tenant = self.require_tenant()?;
        let mapping = self.table_mapping(&tenant, &request.table_name).await?;
        request.table_name = mapping.physical_table().name.clone();
        request.key = mapping.key_mapper().apply(&tenant, &request.key)?;

        let mut output = self.inner.store.get_item(request).await?;
        if let Some(item) = &output.item {
            output.item = Some(mapping.item_mapper().reverse(&tenant, item)?);
        }
        Ok(output)
    }

    pub async fn put_item(&self, mut request: PutItemRequest) -> Result<PutItemOutput> {
        let tenant = self.require_tenant()?;
        let mapping = self.table_mapping(&tenant, &request.table_name).await?;
        request.table_name = mapping.physical_table().name.clone();

        mapping
            .condition_mapper()
            .apply(&tenant, &mut PutRequestWrapper(&mut request))?;
        request.item = mapping.item_mapper().apply(&tenant, &request.item)?;

        self.inner.store.put_item(request).await
    }

    pub async fn update_item(&self, mut request: UpdateItemRequest) -> Result<UpdateItemOutput> {
        reject_option(
            request.attribute_updates.is_some(),
            "attribute_updates",
            "UpdateItem",
        )?;

        let tenant = self.require_tenant()?;
        let mapping = self.table_mapping(&tenant, &request.table_name).await?;
        request.table_name = mapping.physical_table().name.clone();
        request.key = mapping.key_mapper().apply(&tenant, &request.key)?;

        mapping
            .condition_mapper()
            .apply(&tenant, &mut UpdateRequestWrapper(&mut request))?;

        self.inner.store.update_item(request).await
    }

    pub async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        let tenant = self.require_tenant()?;
        self.delete_item_internal(&tenant, request).await
    }

    async fn delete_item_internal(
        &self,
        tenant: &str,
        mut request: DeleteItemRequest,
    ) -> Result<DeleteItemOutput> {
        let mapping = self.table_mapping(tenant, &request.table_name).await?;
        request.table_name = mapping.physical_table().name.clone();
        request.key = mapping.key_mapper().apply(tenant, &request.key)?;

        mapping
            .condition_mapper()
            .apply(tenant, &mut DeleteRequestWrapper(&mut request))?;

        self.inner.store.delete_item(request).await
    }

    pub async fn batch_get_item(&self, request: BatchGetItemRequest) -> Result<BatchGetItemOutput> {
        for keys_and_attributes in request.request_items.values() {
            reject_option(
                keys_and_attributes.consistent_read.is_some(),
                "consistent_read",
                "BatchGetItem",
            )?;
            reject_option(
                keys_and_attributes.attributes_to_get.is_some(),
                "attributes_to_get",
                "BatchGetItem",
            )?;
            reject_option(
                keys_and_attributes.projection_expression.is_some(),
                "projection_expression",
                "BatchGetItem",
            )?;
            reject_option(
                keys_and_attributes.expression_attribute_names.is_some(),
                "expression_attribute_names",
                "BatchGetItem",
            )?;
        }

        let tenant = self.require_tenant()?;

        // Map each virtual table's name and keys. Two virtual tables may
        // share one physical table, so physical key lists merge.
        let mut mappings: HashMap<String, Arc<TableMapping>> = HashMap::new();
        let mut physical_items: HashMap<String, KeysAndAttributes> = HashMap::new();
        for (virtual_table, keys_and_attributes) in &request.request_items {
            let mapping = self.table_mapping(&tenant, virtual_table).await?;
            let physical_name = mapping.physical_table().name.clone();
            let entry = physical_items
                .entry(physical_name)
                .or_insert_with(|| KeysAndAttributes::with_keys(Vec::new()));
            for key in &keys_and_attributes.keys {
                entry.keys.push(mapping.key_mapper().apply(&tenant, key)?);
            }
            mappings.insert(virtual_table.clone(), mapping);
        }

        let output = self
            .inner
            .store
            .batch_get_item(BatchGetItemRequest {
                request_items: physical_items,
            })
            .await?;

        // Demultiplex responses by the virtual table name decoded out of
        // each item's hash key prefix.
        let mut responses: HashMap<String, Vec<Item>> = request
            .request_items
            .keys()
            .map(|virtual_table| (virtual_table.clone(), Vec::new()))
            .collect();
        for (physical_table, items) in &output.responses {
            for item in items {
                let mapping = self.mapping_for_physical_key(&mappings, physical_table, item)?;
                responses
                    .entry(mapping.virtual_table().name.clone())
                    .or_default()
                    .push(mapping.item_mapper().reverse(&tenant, item)?);
            }
        }

        // Unprocessed keys map back through the key mapper, so callers may
        // retry with virtual keys.
        let mut unprocessed_keys: HashMap<String, KeysAndAttributes> = HashMap::new();
        for (physical_table, keys_and_attributes) in &output.unprocessed_keys {
            for key in &keys_and_attributes.keys {
                let mapping = self.mapping_for_physical_key(&mappings, physical_table, key)?;
                unprocessed_keys
                    .entry(mapping.virtual_table().name.clone())
                    .or_insert_with(|| KeysAndAttributes::with_keys(Vec::new()))
                    .keys
                    .push(mapping.key_mapper().reverse(&tenant, key)?);
            }
        }

        Ok(BatchGetItemOutput {
            responses,
            unprocessed_keys,
        })
    }

    /// Resolve which requested virtual table a physical item belongs to by
    /// decoding the qualifier out of its hash key.
    fn mapping_for_physical_key<'m>(
        &self,
        mappings: &'m HashMap<String, Arc<TableMapping>>,
        physical_table: &str,
        physical_key: &Item,
    ) -> Result<&'m Arc<TableMapping>> {
        let decoded = self.field_value_decoder(physical_table)?.decode(physical_key)?;
        mappings.get(&decoded.qualifier).ok_or_else(|| {
            Error::Internal(format!(
                "backing store returned an item for unrequested table '{}'",
                decoded.qualifier
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Query and scan
    // -----------------------------------------------------------------------

    pub async fn query(&self, mut request: QueryRequest) -> Result<QueryOutput> {
        let tenant = self.require_tenant()?;
        let mapping = self.table_mapping(&tenant, &request.table_name).await?;
        request.table_name = mapping.physical_table().name.clone();

        mapping
            .query_and_scan_mapper()
            .apply_query(&tenant, &mut request)?;

        let output = self.inner.store.query(request).await?;
        let items = output
            .items
            .iter()
            .map(|item| mapping.item_mapper().reverse(&tenant, item))
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = match &output.last_evaluated_key {
            Some(key) => Some(mapping.item_mapper().reverse(&tenant, key)?),
            None => None,
        };
        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    pub async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        let tenant = self.require_tenant()?;
        self.scan_internal(&tenant, request).await
    }

    async fn scan_internal(&self, tenant: &str, mut request: ScanRequest) -> Result<ScanOutput> {
        let mapping = self.table_mapping(tenant, &request.table_name).await?;
        let virtual_index = request.index_name.clone();
        request.table_name = mapping.physical_table().name.clone();

        mapping
            .query_and_scan_mapper()
            .apply_scan(tenant, &mut request)?;

        let deadline = self
            .inner
            .clock
            .now_millis()
            .saturating_add(self.inner.get_records_time_limit);

        // Many tenants share one physical table, so the tenant filter may
        // eliminate every row of a physical page. Keep moving forward until
        // at least one row survives or the cursor terminates; an empty page
        // with a cursor must not masquerade as end-of-stream.
        let mut output = self.inner.store.scan(request.clone()).await?;
        while output.items.is_empty() && output.last_evaluated_key.is_some() {
            if self.inner.clock.now_millis() >= deadline {
                debug!(name = %self.inner.name, "scan soft time limit hit, returning resumption cursor");
                // The physical cursor may point at another tenant's row and
                // has no virtual spelling; it round-trips opaquely through
                // exclusive_start_key.
                return Ok(ScanOutput {
                    items: Vec::new(),
                    last_evaluated_key: output.last_evaluated_key,
                });
            }
            request.exclusive_start_key = output.last_evaluated_key.take();
            output = self.inner.store.scan(request.clone()).await?;
        }

        let items = output
            .items
            .iter()
            .map(|item| mapping.item_mapper().reverse(tenant, item))
            .collect::<Result<Vec<_>>>()?;

        // The backing store's cursor is physical-scope; derive the caller's
        // cursor from the last returned virtual item restricted to the
        // target index's key attributes.
        let last_evaluated_key = match (output.last_evaluated_key.as_ref(), items.last()) {
            (Some(_), Some(last_item)) => {
                let target = mapping.target_index(virtual_index.as_deref())?;
                let mut key = Item::with_capacity(2);
                for name in target.virtual_key.attribute_names() {
                    let value = last_item.get(name).ok_or_else(|| {
                        Error::Internal(format!("scanned item is missing key attribute '{name}'"))
                    })?;
                    key.insert(name.to_string(), value.clone());
                }
                Some(key)
            }
            _ => None,
        };

        Ok(ScanOutput {
            items,
            last_evaluated_key,
        })
    }

    // -----------------------------------------------------------------------
    // Table operations
    // -----------------------------------------------------------------------

    pub async fn create_table(&self, schema: TableSchema) -> Result<TableDescription> {
        let tenant = self.require_tenant()?;
        let description = self.inner.repo.create_table(&tenant, schema).await?;
        self.with_tenant_stream_arn(&tenant, description).await
    }

    pub async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let tenant = self.require_tenant()?;
        let mut description = self
            .inner
            .repo
            .get_table_description(&tenant, table_name)
            .await?;
        description.status = TableStatus::Active;
        self.with_tenant_stream_arn(&tenant, description).await
    }

    pub async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        let tenant = self.require_tenant()?;
        if self.inner.delete_table_async {
            let description = self
                .inner
                .repo
                .get_table_description(&tenant, table_name)
                .await?;
            let queue = self.inner.delete_queue.as_ref().ok_or_else(|| {
                Error::Internal("delete worker is not running".to_string())
            })?;
            queue
                .send(DeleteJob {
                    tenant,
                    table: table_name.to_string(),
                })
                .map_err(|_| Error::Internal("delete worker is gone".to_string()))?;
            return Ok(description);
        }
        self.delete_table_internal(&tenant, table_name).await
    }

    async fn delete_table_internal(
        &self,
        tenant: &str,
        table_name: &str,
    ) -> Result<TableDescription> {
        info!(name = %self.inner.name, table = table_name, "dropping virtual table");
        self.truncate_table(tenant, table_name).await?;
        let description = self.inner.repo.delete_table(tenant, table_name).await?;
        self.inner.cache.invalidate(tenant, table_name);
        info!(name = %self.inner.name, table = table_name, "dropped virtual table");
        Ok(description)
    }

    /// Truncation goes through the public scan and delete paths, so it is
    /// itself tenant-filtered and paged. Under the scan soft time limit a
    /// very large table may take many pages to drain.
    async fn truncate_table(&self, tenant: &str, table_name: &str) -> Result<()> {
        if !self.inner.truncate_on_delete_table {
            debug!(table = table_name, "truncate on delete disabled, leaving rows behind");
            return Ok(());
        }

        let mapping = self.table_mapping(tenant, table_name).await?;
        let key_names: Vec<String> = mapping
            .virtual_table()
            .primary_key
            .attribute_names()
            .map(String::from)
            .collect();

        let mut deleted = 0usize;
        let mut start_key: Option<Item> = None;
        loop {
            let page = self
                .scan_internal(
                    tenant,
                    ScanRequest {
                        table_name: table_name.to_string(),
                        exclusive_start_key: start_key.take(),
                        ..Default::default()
                    },
                )
                .await?;

            for item in &page.items {
                let mut key = Item::with_capacity(key_names.len());
                for name in &key_names {
                    let value = item.get(name).ok_or_else(|| {
                        Error::Internal(format!("scanned item is missing key attribute '{name}'"))
                    })?;
                    key.insert(name.clone(), value.clone());
                }
                self.delete_item_internal(
                    tenant,
                    DeleteItemRequest {
                        table_name: table_name.to_string(),
                        key,
                        ..Default::default()
                    },
                )
                .await?;
                deleted += 1;
            }

            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }
        info!(table = table_name, items = deleted, "truncated virtual table");
        Ok(())
    }

    async fn with_tenant_stream_arn(
        &self,
        tenant: &str,
        mut description: TableDescription,
    ) -> Result<TableDescription> {
        if description.schema.stream_enabled {
            let mapping = self.table_mapping(tenant, &description.schema.name).await?;
            if let Some(physical_arn) = &mapping.physical_table().stream_arn {
                description.latest_stream_arn = Some(
                    StreamArn::new(physical_arn.clone(), tenant, description.schema.name.clone())
                        .to_string(),
                );
            }
        }
        Ok(description)
    }
}

fn reject_option(present: bool, option: &str, operation: &str) -> Result<()> {
    if present {
        return Err(Error::Unsupported(format!(
            "{option} is not supported on {operation} calls"
        )));
    }
    Ok(())
}
