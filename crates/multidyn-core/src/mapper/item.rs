//! Whole-item and key-only mapping between virtual and physical form.

use crate::error::{Error, Result};
use crate::mapping::TableMapping;
use crate::types::Item;

use super::field::FieldMapper;

/// Rewrites hash and range key attributes of an item (renaming them to the
/// physical attribute names where they differ) and passes every other
/// attribute through unchanged.
pub struct ItemMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> ItemMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    /// Map a virtual item to its physical form.
    ///
    /// Fails with [`Error::InvalidArgument`] when a required key attribute
    /// of the table's primary key is absent.
    pub fn apply(&self, tenant: &str, item: &Item) -> Result<Item> {
        for name in self.mapping.virtual_table().primary_key.attribute_names() {
            if !item.contains_key(name) {
                return Err(Error::InvalidArgument(format!(
                    "missing required key attribute '{name}'"
                )));
            }
        }

        let mut out = Item::with_capacity(item.len());
        for (name, value) in item {
            match self.mapping.field_mapping(name) {
                Some(fm) => {
                    out.insert(fm.target.name.clone(), FieldMapper::apply(tenant, fm, value)?);
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    /// Map a physical item back to its virtual form, undoing both the rename
    /// and the prefix encoding.
    pub fn reverse(&self, tenant: &str, item: &Item) -> Result<Item> {
        let mut out = Item::with_capacity(item.len());
        for (name, value) in item {
            match self.mapping.reverse_field_mapping(name) {
                Some(fm) => {
                    out.insert(fm.target.name.clone(), FieldMapper::reverse(tenant, fm, value)?);
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }
}

/// [`ItemMapper`] restricted to the table's primary key attributes.
///
/// Used for request keys and for mapping unprocessed batch-get keys back to
/// virtual form. The output contains exactly the table's key attributes.
pub struct KeyMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> KeyMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    pub fn apply(&self, tenant: &str, key: &Item) -> Result<Item> {
        let mut out = Item::with_capacity(2);
        for name in self.mapping.virtual_table().primary_key.attribute_names() {
            let value = key.get(name).ok_or_else(|| {
                Error::InvalidArgument(format!("missing required key attribute '{name}'"))
            })?;
            let fm = self.mapping.field_mapping(name).ok_or_else(|| {
                Error::Internal(format!("no field mapping for key attribute '{name}'"))
            })?;
            out.insert(fm.target.name.clone(), FieldMapper::apply(tenant, fm, value)?);
        }
        Ok(out)
    }

    pub fn reverse(&self, tenant: &str, key: &Item) -> Result<Item> {
        let mut out = Item::with_capacity(2);
        for name in self.mapping.virtual_table().primary_key.attribute_names() {
            let fm = self.mapping.field_mapping(name).ok_or_else(|| {
                Error::Internal(format!("no field mapping for key attribute '{name}'"))
            })?;
            let value = key.get(&fm.target.name).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "missing physical key attribute '{}'",
                    fm.target.name
                ))
            })?;
            out.insert(
                name.to_string(),
                FieldMapper::reverse(tenant, &fm.reversed(), value)?,
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::mapping::{PhysicalTableSet, TableMappingFactory};
    use crate::types::{
        AttributeValue, KeyAttribute, PrimaryKey, Projection, ScalarKind, SecondaryIndex,
        TableSchema,
    };

    fn mapping_for(schema: TableSchema) -> TableMapping {
        TableMappingFactory::new(Arc::new(PhysicalTableSet::standard("mt_")))
            .table_mapping(&schema)
            .unwrap()
    }

    fn hash_range_schema() -> TableSchema {
        TableSchema {
            name: "orders".to_string(),
            primary_key: PrimaryKey::hash_and_range(
                KeyAttribute::new("pk", ScalarKind::S),
                KeyAttribute::new("sk", ScalarKind::N),
            ),
            secondary_indexes: vec![SecondaryIndex {
                name: "by-status".to_string(),
                primary_key: PrimaryKey::hash_only(KeyAttribute::new("status", ScalarKind::S)),
                projection: Projection::All,
            }],
            stream_enabled: false,
        }
    }

    fn item() -> Item {
        HashMap::from([
            ("pk".to_string(), AttributeValue::s("a")),
            ("sk".to_string(), AttributeValue::n("7")),
            ("status".to_string(), AttributeValue::s("open")),
            ("note".to_string(), AttributeValue::s("untouched")),
        ])
    }

    #[test]
    fn test_item_apply_renames_and_prefixes() {
        let mapping = mapping_for(hash_range_schema());
        let mapped = mapping.item_mapper().apply("t1", &item()).unwrap();

        assert_eq!(mapped["hk"], AttributeValue::s("t1.orders.a"));
        assert_eq!(mapped["rk"], AttributeValue::n("7"));
        // Index hash key is prefixed under the index name.
        assert_eq!(mapped["gsi0_hk"], AttributeValue::s("t1.by-status.open"));
        // Unmapped attributes pass through.
        assert_eq!(mapped["note"], AttributeValue::s("untouched"));
        assert!(!mapped.contains_key("pk"));
    }

    #[test]
    fn test_item_roundtrip() {
        let mapping = mapping_for(hash_range_schema());
        let mapper = mapping.item_mapper();
        let original = item();
        let restored = mapper.reverse("t1", &mapper.apply("t1", &original).unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_item_apply_missing_key_attribute() {
        let mapping = mapping_for(hash_range_schema());
        let mut incomplete = item();
        incomplete.remove("sk");
        let err = mapping.item_mapper().apply("t1", &incomplete).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_item_sparse_index_attribute_is_optional() {
        let mapping = mapping_for(hash_range_schema());
        let mut sparse = item();
        sparse.remove("status");
        let mapped = mapping.item_mapper().apply("t1", &sparse).unwrap();
        assert!(!mapped.contains_key("gsi0_hk"));
    }

    #[test]
    fn test_key_apply_maps_only_key_attributes() {
        let mapping = mapping_for(hash_range_schema());
        let key = HashMap::from([
            ("pk".to_string(), AttributeValue::s("a")),
            ("sk".to_string(), AttributeValue::n("7")),
        ]);
        let mapped = mapping.key_mapper().apply("t1", &key).unwrap();
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["hk"], AttributeValue::s("t1.orders.a"));
        assert_eq!(mapped["rk"], AttributeValue::n("7"));
    }

    #[test]
    fn test_key_roundtrip() {
        let mapping = mapping_for(hash_range_schema());
        let mapper = mapping.key_mapper();
        let key = HashMap::from([
            ("pk".to_string(), AttributeValue::s("a")),
            ("sk".to_string(), AttributeValue::n("7")),
        ]);
        let restored = mapper.reverse("t1", &mapper.apply("t1", &key).unwrap()).unwrap();
        assert_eq!(restored, key);
    }

    #[test]
    fn test_key_apply_missing_attribute() {
        let mapping = mapping_for(hash_range_schema());
        let key = HashMap::from([("pk".to_string(), AttributeValue::s("a"))]);
        let err = mapping.key_mapper().apply("t1", &key).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_reverse_rejects_foreign_tenant() {
        let mapping = mapping_for(hash_range_schema());
        let mapper = mapping.item_mapper();
        let physical = mapper.apply("t1", &item()).unwrap();
        let err = mapper.reverse("t2", &physical).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }
}
