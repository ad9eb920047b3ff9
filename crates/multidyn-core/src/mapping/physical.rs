//! The fixed set of physical tables the layer multiplexes onto.
//!
//! Physical tables are assumed pre-provisioned in the backing store; the set
//! is enumerated once at startup, ordered, and immutable afterwards. Tables
//! are typed by the shape of their primary key: every hash key column is `S`
//! or `B` (prefixed values), range key columns keep the virtual kind.

use crate::types::{KeyAttribute, PhysicalTable, PrimaryKey, Projection, ScalarKind, SecondaryIndex};

/// The fixed, ordered collection of physical tables.
#[derive(Debug, Clone)]
pub struct PhysicalTableSet {
    tables: Vec<PhysicalTable>,
}

impl PhysicalTableSet {
    pub fn new(tables: Vec<PhysicalTable>) -> Self {
        Self { tables }
    }

    /// The standard shapes, named `<prefix><hash-kind>[_<range-kind>]`.
    ///
    /// Covers string/binary hash keys crossed with no range and S/N/B range
    /// kinds. Each table carries secondary indexes whose hash column is of
    /// the table's hash kind with one index per range shape, so a virtual
    /// index can land on an index of matching shape.
    pub fn standard(prefix: &str) -> Self {
        let mut tables = Vec::new();
        for hash_kind in [ScalarKind::S, ScalarKind::B] {
            for range_kind in [None, Some(ScalarKind::S), Some(ScalarKind::N), Some(ScalarKind::B)] {
                tables.push(standard_table(prefix, hash_kind, range_kind));
            }
        }
        Self { tables }
    }

    pub fn tables(&self) -> &[PhysicalTable] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&PhysicalTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

fn kind_tag(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::S => "s",
        ScalarKind::N => "n",
        ScalarKind::B => "b",
    }
}

fn standard_table(prefix: &str, hash_kind: ScalarKind, range_kind: Option<ScalarKind>) -> PhysicalTable {
    let name = match range_kind {
        Some(rk) => format!("{prefix}{}_{}", kind_tag(hash_kind), kind_tag(rk)),
        None => format!("{prefix}{}", kind_tag(hash_kind)),
    };

    let range = range_kind.map(|rk| KeyAttribute::new("rk", rk));
    let primary_key = PrimaryKey {
        hash: KeyAttribute::new("hk", hash_kind),
        range,
    };

    // Four index shapes per table: hash-only plus one per range kind. Index
    // hash columns share the table's hash kind.
    let mut secondary_indexes = Vec::new();
    for (i, index_range) in [None, Some(ScalarKind::S), Some(ScalarKind::N), Some(ScalarKind::B)]
        .into_iter()
        .enumerate()
    {
        let index_name = match index_range {
            Some(rk) => format!("gsi_{}_{}", kind_tag(hash_kind), kind_tag(rk)),
            None => format!("gsi_{}", kind_tag(hash_kind)),
        };
        secondary_indexes.push(SecondaryIndex {
            name: index_name,
            primary_key: PrimaryKey {
                hash: KeyAttribute::new(format!("gsi{i}_hk"), hash_kind),
                range: index_range.map(|rk| KeyAttribute::new(format!("gsi{i}_rk"), rk)),
            },
            projection: Projection::All,
        });
    }

    PhysicalTable {
        name: name.clone(),
        primary_key,
        secondary_indexes,
        stream_arn: Some(format!(
            "arn:aws:dynamodb:local:000000000000:table/{name}/stream/1"
        )),
    }
}
