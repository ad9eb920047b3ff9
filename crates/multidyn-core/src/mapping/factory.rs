//! Deterministic virtual-to-physical table selection.
//!
//! Selection depends only on the virtual schema's signature (hash kind,
//! range shape, secondary index shapes), never on the tenant: the first
//! physical table in the fixed ordered list whose shape is compatible wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mapper::field::{FieldMapping, IndexType, MappedField};
use crate::mapper::prefix::DELIMITER;
use crate::types::{
    KeyAttribute, PhysicalTable, PrimaryKey, Projection, ScalarKind, SecondaryIndex, TableSchema,
};

use super::{IndexMapping, PhysicalTableSet, TableMapping};

/// Builds [`TableMapping`]s against a fixed physical table set.
#[derive(Debug, Clone)]
pub struct TableMappingFactory {
    tables: Arc<PhysicalTableSet>,
}

impl TableMappingFactory {
    pub fn new(tables: Arc<PhysicalTableSet>) -> Self {
        Self { tables }
    }

    pub fn physical_tables(&self) -> &PhysicalTableSet {
        &self.tables
    }

    /// Choose a physical table for `schema` and build the field mappings.
    ///
    /// Fails with [`Error::NoPhysicalTable`] when no fixed table matches the
    /// schema's signature.
    pub fn table_mapping(&self, schema: &TableSchema) -> Result<TableMapping> {
        validate_schema(schema)?;

        for physical in self.tables.tables() {
            if let Some(assignment) = try_assign(schema, physical) {
                return Ok(build_mapping(schema, physical, assignment));
            }
        }

        Err(Error::NoPhysicalTable {
            virtual_table: schema.name.clone(),
            reason: format!(
                "no fixed table is compatible with hash kind {:?}, range {:?}, {} secondary index(es)",
                schema.primary_key.hash.kind,
                schema.primary_key.range.as_ref().map(|r| r.kind),
                schema.secondary_indexes.len()
            ),
        })
    }
}

/// Names that take part in prefix encoding must not contain the delimiter.
fn validate_schema(schema: &TableSchema) -> Result<()> {
    if schema.name.contains(DELIMITER) {
        return Err(Error::InvalidArgument(format!(
            "table name '{}' must not contain '{DELIMITER}'",
            schema.name
        )));
    }
    for si in &schema.secondary_indexes {
        if si.name.contains(DELIMITER) {
            return Err(Error::InvalidArgument(format!(
                "index name '{}' must not contain '{DELIMITER}'",
                si.name
            )));
        }
    }
    Ok(())
}

/// A prefixed hash column must be `S` for string and numeric virtual keys
/// (numbers coerce to their decimal string) and `B` for binary ones.
fn hash_compatible(r#virtual: ScalarKind, physical: ScalarKind) -> bool {
    match r#virtual {
        ScalarKind::S | ScalarKind::N => physical == ScalarKind::S,
        ScalarKind::B => physical == ScalarKind::B,
    }
}

/// Range keys are unprefixed, so the kinds must match exactly.
fn range_compatible(r#virtual: Option<&KeyAttribute>, physical: Option<&KeyAttribute>) -> bool {
    match (r#virtual, physical) {
        (None, None) => true,
        (Some(v), Some(p)) => v.kind == p.kind,
        _ => false,
    }
}

fn projection_compatible(r#virtual: &Projection, physical: &Projection) -> bool {
    *physical == Projection::All || r#virtual == physical
}

fn key_compatible(r#virtual: &PrimaryKey, physical: &PrimaryKey) -> bool {
    hash_compatible(r#virtual.hash.kind, physical.hash.kind)
        && range_compatible(r#virtual.range.as_ref(), physical.range.as_ref())
}

/// Assign each virtual secondary index, in declaration order, to the first
/// unused compatible physical index. Returns `None` when the table's own key
/// or any index cannot be placed.
fn try_assign<'p>(
    schema: &TableSchema,
    physical: &'p PhysicalTable,
) -> Option<Vec<&'p SecondaryIndex>> {
    if !key_compatible(&schema.primary_key, &physical.primary_key) {
        return None;
    }

    let mut used = vec![false; physical.secondary_indexes.len()];
    let mut assignment = Vec::with_capacity(schema.secondary_indexes.len());
    for vsi in &schema.secondary_indexes {
        let slot = physical.secondary_indexes.iter().enumerate().find(|(i, psi)| {
            !used[*i]
                && key_compatible(&vsi.primary_key, &psi.primary_key)
                && projection_compatible(&vsi.projection, &psi.projection)
        });
        match slot {
            Some((i, psi)) => {
                used[i] = true;
                assignment.push(psi);
            }
            None => return None,
        }
    }
    Some(assignment)
}

fn key_field_mappings(
    virtual_key: &PrimaryKey,
    physical_key: &PrimaryKey,
    virtual_index_name: &str,
    physical_index_name: &str,
    index_type: IndexType,
) -> Vec<FieldMapping> {
    let mut mappings = vec![FieldMapping {
        source: MappedField::new(&virtual_key.hash.name, virtual_key.hash.kind),
        target: MappedField::new(&physical_key.hash.name, physical_key.hash.kind),
        virtual_index_name: virtual_index_name.to_string(),
        physical_index_name: physical_index_name.to_string(),
        index_type,
        context_aware: true,
    }];
    if let (Some(vr), Some(pr)) = (&virtual_key.range, &physical_key.range) {
        mappings.push(FieldMapping {
            source: MappedField::new(&vr.name, vr.kind),
            target: MappedField::new(&pr.name, pr.kind),
            virtual_index_name: virtual_index_name.to_string(),
            physical_index_name: physical_index_name.to_string(),
            index_type,
            context_aware: false,
        });
    }
    mappings
}

fn build_mapping(
    schema: &TableSchema,
    physical: &PhysicalTable,
    assignment: Vec<&SecondaryIndex>,
) -> TableMapping {
    let mut virtual_to_physical: HashMap<String, FieldMapping> = HashMap::new();
    let mut index_mappings = HashMap::new();

    // Table key mappings first: when a field serves both the table key and
    // an index key, the table mapping wins the write-time slot.
    for fm in key_field_mappings(
        &schema.primary_key,
        &physical.primary_key,
        &schema.name,
        &physical.name,
        IndexType::Table,
    ) {
        virtual_to_physical.insert(fm.source.name.clone(), fm);
    }

    for (vsi, psi) in schema.secondary_indexes.iter().zip(assignment) {
        for fm in key_field_mappings(
            &vsi.primary_key,
            &psi.primary_key,
            &vsi.name,
            &psi.name,
            IndexType::SecondaryIndex,
        ) {
            virtual_to_physical.entry(fm.source.name.clone()).or_insert(fm);
        }
        index_mappings.insert(
            vsi.name.clone(),
            IndexMapping {
                virtual_name: vsi.name.clone(),
                physical_name: psi.name.clone(),
                virtual_key: vsi.primary_key.clone(),
                physical_key: psi.primary_key.clone(),
            },
        );
    }

    TableMapping::new(
        schema.clone(),
        physical.clone(),
        virtual_to_physical,
        index_mappings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> TableMappingFactory {
        TableMappingFactory::new(Arc::new(PhysicalTableSet::standard("mt_")))
    }

    fn schema(hash_kind: ScalarKind, range_kind: Option<ScalarKind>) -> TableSchema {
        TableSchema {
            name: "orders".to_string(),
            primary_key: PrimaryKey {
                hash: KeyAttribute::new("pk", hash_kind),
                range: range_kind.map(|k| KeyAttribute::new("sk", k)),
            },
            secondary_indexes: vec![],
            stream_enabled: false,
        }
    }

    #[test]
    fn test_selects_first_compatible_table() {
        let mapping = factory().table_mapping(&schema(ScalarKind::S, None)).unwrap();
        assert_eq!(mapping.physical_table().name, "mt_s");

        let mapping = factory()
            .table_mapping(&schema(ScalarKind::S, Some(ScalarKind::N)))
            .unwrap();
        assert_eq!(mapping.physical_table().name, "mt_s_n");
    }

    #[test]
    fn test_numeric_hash_lands_on_string_table() {
        let mapping = factory().table_mapping(&schema(ScalarKind::N, None)).unwrap();
        assert_eq!(mapping.physical_table().name, "mt_s");
        let fm = mapping.field_mapping("pk").unwrap();
        assert_eq!(fm.source.kind, ScalarKind::N);
        assert_eq!(fm.target.kind, ScalarKind::S);
        assert!(fm.context_aware);
    }

    #[test]
    fn test_binary_hash_lands_on_binary_table() {
        let mapping = factory().table_mapping(&schema(ScalarKind::B, None)).unwrap();
        assert_eq!(mapping.physical_table().name, "mt_b");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let s = schema(ScalarKind::S, Some(ScalarKind::S));
        let a = factory().table_mapping(&s).unwrap();
        let b = factory().table_mapping(&s).unwrap();
        assert_eq!(a.physical_table().name, b.physical_table().name);
    }

    #[test]
    fn test_range_key_not_context_aware() {
        let mapping = factory()
            .table_mapping(&schema(ScalarKind::S, Some(ScalarKind::N)))
            .unwrap();
        let fm = mapping.field_mapping("sk").unwrap();
        assert!(!fm.context_aware);
        assert_eq!(fm.target.name, "rk");
    }

    #[test]
    fn test_index_assignment_in_declaration_order() {
        let mut s = schema(ScalarKind::S, Some(ScalarKind::S));
        s.secondary_indexes = vec![
            SecondaryIndex {
                name: "by-status".to_string(),
                primary_key: PrimaryKey::hash_only(KeyAttribute::new("status", ScalarKind::S)),
                projection: Projection::All,
            },
            SecondaryIndex {
                name: "by-created".to_string(),
                primary_key: PrimaryKey::hash_and_range(
                    KeyAttribute::new("status", ScalarKind::S),
                    KeyAttribute::new("created", ScalarKind::N),
                ),
                projection: Projection::All,
            },
        ];
        let mapping = factory().table_mapping(&s).unwrap();

        let im = mapping.index_mapping("by-status").unwrap();
        assert_eq!(im.physical_name, "gsi_s");
        let im = mapping.index_mapping("by-created").unwrap();
        assert_eq!(im.physical_name, "gsi_s_n");
    }

    #[test]
    fn test_no_physical_table() {
        // More hash-only indexes than any standard table carries.
        let mut s = schema(ScalarKind::S, None);
        s.secondary_indexes = (0..2)
            .map(|i| SecondaryIndex {
                name: format!("extra-{i}"),
                primary_key: PrimaryKey::hash_only(KeyAttribute::new(format!("f{i}"), ScalarKind::S)),
                projection: Projection::All,
            })
            .collect();
        let err = factory().table_mapping(&s).unwrap_err();
        assert!(matches!(err, Error::NoPhysicalTable { .. }));
    }

    #[test]
    fn test_table_name_with_delimiter_rejected() {
        let mut s = schema(ScalarKind::S, None);
        s.name = "bad.name".to_string();
        assert!(matches!(
            factory().table_mapping(&s),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_target_index_resolution() {
        let mut s = schema(ScalarKind::S, None);
        s.secondary_indexes = vec![SecondaryIndex {
            name: "by-status".to_string(),
            primary_key: PrimaryKey::hash_only(KeyAttribute::new("status", ScalarKind::S)),
            projection: Projection::All,
        }];
        let mapping = factory().table_mapping(&s).unwrap();

        let target = mapping.target_index(None).unwrap();
        assert_eq!(target.qualifier, "orders");
        assert_eq!(target.physical_hash.name, "hk");
        assert!(target.physical_index_name.is_none());

        let target = mapping.target_index(Some("by-status")).unwrap();
        assert_eq!(target.qualifier, "by-status");
        assert_eq!(target.physical_index_name, Some("gsi_s"));
        assert_eq!(target.virtual_key.hash.name, "status");

        assert!(mapping.target_index(Some("missing")).is_err());
    }
}
