//! Virtual-to-physical table mappings.
//!
//! A [`TableMapping`] is owned by one `(tenant, virtual table)` pair, built
//! lazily by the [`TableMappingFactory`] and cached. It bundles the chosen
//! physical table with the per-field mappings and exposes the item, key,
//! condition, and query/scan mappers. Never mutated after construction;
//! shared via `Arc`.

pub mod factory;
pub mod physical;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mapper::condition::ConditionMapper;
use crate::mapper::field::FieldMapping;
use crate::mapper::item::{ItemMapper, KeyMapper};
use crate::mapper::query_scan::QueryAndScanMapper;
use crate::types::{KeyAttribute, PhysicalTable, PrimaryKey, TableSchema};

pub use factory::TableMappingFactory;
pub use physical::PhysicalTableSet;

/// How one virtual secondary index lands on a physical one.
#[derive(Debug, Clone)]
pub struct IndexMapping {
    pub virtual_name: String,
    pub physical_name: String,
    pub virtual_key: PrimaryKey,
    pub physical_key: PrimaryKey,
}

/// The resolved target of a query or scan: either the table's own primary
/// key or one named secondary index.
#[derive(Debug)]
pub struct TargetIndex<'a> {
    /// Key attributes under their virtual names.
    pub virtual_key: &'a PrimaryKey,
    /// Physical index name to substitute, `None` when targeting the table.
    pub physical_index_name: Option<&'a str>,
    /// The physical column holding the prefixed hash key.
    pub physical_hash: &'a KeyAttribute,
    /// Prefix qualifier: virtual table name or virtual index name.
    pub qualifier: &'a str,
}

/// Field mappings and physical table choice for one virtual table.
#[derive(Debug)]
pub struct TableMapping {
    virtual_table: TableSchema,
    physical_table: PhysicalTable,
    /// Write-time mappings keyed by virtual field name.
    virtual_to_physical: HashMap<String, FieldMapping>,
    /// Read-time (reversed) mappings keyed by physical field name.
    physical_to_virtual: HashMap<String, FieldMapping>,
    /// Per-virtual-index sub-tables.
    index_mappings: HashMap<String, IndexMapping>,
}

impl TableMapping {
    pub(crate) fn new(
        virtual_table: TableSchema,
        physical_table: PhysicalTable,
        virtual_to_physical: HashMap<String, FieldMapping>,
        index_mappings: HashMap<String, IndexMapping>,
    ) -> Self {
        let physical_to_virtual = virtual_to_physical
            .values()
            .map(|fm| (fm.target.name.clone(), fm.reversed()))
            .collect();
        Self {
            virtual_table,
            physical_table,
            virtual_to_physical,
            physical_to_virtual,
            index_mappings,
        }
    }

    pub fn virtual_table(&self) -> &TableSchema {
        &self.virtual_table
    }

    pub fn physical_table(&self) -> &PhysicalTable {
        &self.physical_table
    }

    /// Write-time mapping for a virtual field, if the field is mapped.
    pub fn field_mapping(&self, virtual_field: &str) -> Option<&FieldMapping> {
        self.virtual_to_physical.get(virtual_field)
    }

    /// Read-time (already reversed) mapping for a physical field.
    pub fn reverse_field_mapping(&self, physical_field: &str) -> Option<&FieldMapping> {
        self.physical_to_virtual.get(physical_field)
    }

    /// All write-time field mappings.
    pub fn field_mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        self.virtual_to_physical.values()
    }

    pub fn index_mapping(&self, virtual_index: &str) -> Result<&IndexMapping> {
        self.index_mappings.get(virtual_index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown index '{virtual_index}' on table '{}'",
                self.virtual_table.name
            ))
        })
    }

    /// Resolve the primary key targeted by a query or scan: the table's own
    /// when `index_name` is `None`, the named secondary index's otherwise.
    pub fn target_index(&self, index_name: Option<&str>) -> Result<TargetIndex<'_>> {
        match index_name {
            None => Ok(TargetIndex {
                virtual_key: &self.virtual_table.primary_key,
                physical_index_name: None,
                physical_hash: &self.physical_table.primary_key.hash,
                qualifier: &self.virtual_table.name,
            }),
            Some(name) => {
                let im = self.index_mapping(name)?;
                Ok(TargetIndex {
                    virtual_key: &im.virtual_key,
                    physical_index_name: Some(&im.physical_name),
                    physical_hash: &im.physical_key.hash,
                    qualifier: &im.virtual_name,
                })
            }
        }
    }

    pub fn item_mapper(&self) -> ItemMapper<'_> {
        ItemMapper::new(self)
    }

    pub fn key_mapper(&self) -> KeyMapper<'_> {
        KeyMapper::new(self)
    }

    pub fn condition_mapper(&self) -> ConditionMapper<'_> {
        ConditionMapper::new(self)
    }

    pub fn query_and_scan_mapper(&self) -> QueryAndScanMapper<'_> {
        QueryAndScanMapper::new(self)
    }
}
