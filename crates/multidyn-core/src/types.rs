//! Core types: scalar kinds, attribute values, key schemas, virtual table
//! schemas, and physical table descriptions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The scalar kind of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// UTF-8 string.
    S,
    /// Number, carried as its canonical decimal string.
    N,
    /// Raw byte sequence.
    B,
}

/// An attribute value.
///
/// Externally tagged, so the serde JSON form follows the familiar wire shape
/// (`{"S": "x"}`, `{"N": "42"}`). Binary values serialize as byte arrays.
/// Only the scalar variants (`S`, `N`, `B`) may appear as key attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(Vec<u8>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null,
}

impl AttributeValue {
    /// Create a string value.
    pub fn s(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    /// Create a numeric value from its decimal string form.
    pub fn n(value: impl Into<String>) -> Self {
        AttributeValue::N(value.into())
    }

    /// Create a binary value.
    pub fn b(value: impl Into<Vec<u8>>) -> Self {
        AttributeValue::B(value.into())
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_b(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::B(b) => Some(b),
            _ => None,
        }
    }

    /// The scalar kind of this value, if it is a scalar.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            AttributeValue::S(_) => Some(ScalarKind::S),
            AttributeValue::N(_) => Some(ScalarKind::N),
            AttributeValue::B(_) => Some(ScalarKind::B),
            _ => None,
        }
    }
}

/// An item: attribute name to attribute value.
pub type Item = HashMap<String, AttributeValue>;

/// A key attribute definition (name + scalar kind).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub kind: ScalarKind,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A primary key: hash attribute plus optional range attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub hash: KeyAttribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<KeyAttribute>,
}

impl PrimaryKey {
    pub fn hash_only(hash: KeyAttribute) -> Self {
        Self { hash, range: None }
    }

    pub fn hash_and_range(hash: KeyAttribute, range: KeyAttribute) -> Self {
        Self {
            hash,
            range: Some(range),
        }
    }

    /// The declared key attribute names, hash first.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash.name.as_str()).chain(self.range.iter().map(|r| r.name.as_str()))
    }
}

/// Projection rule for a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// A secondary index: its own primary key plus a projection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub name: String,
    pub primary_key: PrimaryKey,
    pub projection: Projection,
}

/// Schema of a virtual table, as a tenant sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub secondary_indexes: Vec<SecondaryIndex>,
    #[serde(default)]
    pub stream_enabled: bool,
}

impl TableSchema {
    /// Look up a secondary index by name.
    pub fn find_index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.secondary_indexes.iter().find(|si| si.name == name)
    }
}

/// A physical table in the backing store, shared across tenants.
///
/// The hash key kind is always `S` or `B`; the set of physical tables is
/// fixed at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalTable {
    pub name: String,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub secondary_indexes: Vec<SecondaryIndex>,
    /// Stream ARN of the physical table, when streams are provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_arn: Option<String>,
}

/// Lifecycle status reported in a table description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    Creating,
    Active,
    Deleting,
}

/// Description of a virtual table as returned by the table operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub schema: TableSchema,
    pub status: TableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_stream_arn: Option<String>,
}

/// Comparison operator of a legacy `{attribute -> Condition}` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    Between,
}

/// A legacy condition: operator plus operand values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub comparison_operator: ComparisonOperator,
    pub attribute_value_list: Vec<AttributeValue>,
}

impl Condition {
    pub fn eq(value: AttributeValue) -> Self {
        Self {
            comparison_operator: ComparisonOperator::Eq,
            attribute_value_list: vec![value],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_value_wire_shape() {
        let val = AttributeValue::s("hello");
        assert_eq!(serde_json::to_value(&val).unwrap(), json!({"S": "hello"}));

        let val = AttributeValue::n("42");
        assert_eq!(serde_json::to_value(&val).unwrap(), json!({"N": "42"}));

        let val = AttributeValue::b(vec![1u8, 2, 3]);
        assert_eq!(serde_json::to_value(&val).unwrap(), json!({"B": [1, 2, 3]}));
    }

    #[test]
    fn test_attribute_value_roundtrip() {
        let val = AttributeValue::M(HashMap::from([(
            "inner".to_string(),
            AttributeValue::L(vec![AttributeValue::Bool(true), AttributeValue::Null]),
        )]));
        let encoded = serde_json::to_string(&val).unwrap();
        let decoded: AttributeValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(val, decoded);
    }

    #[test]
    fn test_scalar_kind() {
        assert_eq!(AttributeValue::s("x").scalar_kind(), Some(ScalarKind::S));
        assert_eq!(AttributeValue::n("1").scalar_kind(), Some(ScalarKind::N));
        assert_eq!(AttributeValue::b(vec![0]).scalar_kind(), Some(ScalarKind::B));
        assert_eq!(AttributeValue::Bool(false).scalar_kind(), None);
    }

    #[test]
    fn test_primary_key_attribute_names() {
        let pk = PrimaryKey::hash_and_range(
            KeyAttribute::new("pk", ScalarKind::S),
            KeyAttribute::new("sk", ScalarKind::N),
        );
        let names: Vec<&str> = pk.attribute_names().collect();
        assert_eq!(names, vec!["pk", "sk"]);

        let pk = PrimaryKey::hash_only(KeyAttribute::new("pk", ScalarKind::S));
        let names: Vec<&str> = pk.attribute_names().collect();
        assert_eq!(names, vec!["pk"]);
    }

    #[test]
    fn test_find_index() {
        let schema = TableSchema {
            name: "orders".to_string(),
            primary_key: PrimaryKey::hash_only(KeyAttribute::new("id", ScalarKind::S)),
            secondary_indexes: vec![SecondaryIndex {
                name: "by-customer".to_string(),
                primary_key: PrimaryKey::hash_only(KeyAttribute::new("customer", ScalarKind::S)),
                projection: Projection::All,
            }],
            stream_enabled: false,
        };
        assert!(schema.find_index("by-customer").is_some());
        assert!(schema.find_index("missing").is_none());
    }
}
