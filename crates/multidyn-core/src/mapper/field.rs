//! Per-field mapping between virtual and physical attribute values.
//!
//! A [`FieldMapping`] ties one virtual attribute to one physical attribute.
//! Context-aware mappings carry the tenant prefix on the way down and strip
//! it on the way back up; non-context-aware mappings only coerce between
//! scalar kinds (numeric virtual keys stored under string physical columns).

use crate::error::{Error, Result};
use crate::types::{AttributeValue, ScalarKind};

use super::prefix;

/// Whether a mapping belongs to the table's own primary key or to a
/// secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Table,
    SecondaryIndex,
}

/// One side of a field mapping: attribute name plus declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedField {
    pub name: String,
    pub kind: ScalarKind,
}

impl MappedField {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Descriptor tying one virtual attribute to one physical attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: MappedField,
    pub target: MappedField,
    /// Virtual table name for table mappings, virtual index name otherwise.
    pub virtual_index_name: String,
    pub physical_index_name: String,
    pub index_type: IndexType,
    /// When true, values carry the tenant prefix.
    pub context_aware: bool,
}

impl FieldMapping {
    /// The same mapping with source and target swapped, for the read path.
    pub fn reversed(&self) -> FieldMapping {
        FieldMapping {
            source: self.target.clone(),
            target: self.source.clone(),
            virtual_index_name: self.virtual_index_name.clone(),
            physical_index_name: self.physical_index_name.clone(),
            index_type: self.index_type,
            context_aware: self.context_aware,
        }
    }
}

/// Applies and reverses field mappings on individual attribute values.
///
/// Stateless; the tenant is threaded in by the caller on every call.
pub struct FieldMapper;

impl FieldMapper {
    /// Map a virtual attribute value to its physical form.
    ///
    /// The output kind equals `mapping.target.kind`. Fails with
    /// [`Error::Unsupported`] when the value does not carry the source kind
    /// or the source kind cannot be expressed in the target kind.
    pub fn apply(tenant: &str, mapping: &FieldMapping, value: &AttributeValue) -> Result<AttributeValue> {
        match mapping.target.kind {
            ScalarKind::S => {
                let source = source_as_string(mapping, value)?;
                if mapping.context_aware {
                    let encoded = prefix::apply_string(tenant, &mapping.virtual_index_name, &source)?;
                    Ok(AttributeValue::S(encoded))
                } else {
                    Ok(AttributeValue::S(source))
                }
            }
            ScalarKind::B => {
                let source = source_as_bytes(mapping, value)?;
                if mapping.context_aware {
                    let encoded = prefix::apply_binary(tenant, &mapping.virtual_index_name, &source)?;
                    Ok(AttributeValue::B(encoded))
                } else {
                    Ok(AttributeValue::B(source))
                }
            }
            ScalarKind::N => {
                // A numeric physical column never carries a prefix; only a
                // numeric source fits.
                if mapping.context_aware {
                    return Err(Error::Unsupported(format!(
                        "numeric target field '{}' cannot carry a tenant prefix",
                        mapping.target.name
                    )));
                }
                let n = value.as_n().ok_or_else(|| convert_error(mapping, value))?;
                Ok(AttributeValue::N(n.to_string()))
            }
        }
    }

    /// Map a physical attribute value back to its virtual form.
    ///
    /// `mapping` must already be reversed (source = physical field). Fails
    /// with [`Error::Corrupt`] when the encoded value lacks the expected
    /// delimiters or names a tenant other than `tenant`.
    pub fn reverse(tenant: &str, mapping: &FieldMapping, value: &AttributeValue) -> Result<AttributeValue> {
        if !mapping.context_aware {
            // Unprefixed fields carry no tenant state; the kind coercion is
            // the same in both directions.
            return Self::apply(tenant, mapping, value);
        }
        match mapping.source.kind {
            ScalarKind::S => {
                let encoded = value.as_s().ok_or_else(|| convert_error(mapping, value))?;
                let fv = prefix::reverse_string(encoded)?;
                check_tenant(tenant, &fv.tenant)?;
                restore_kind_str(mapping, &fv.value)
            }
            ScalarKind::B => {
                let encoded = value.as_b().ok_or_else(|| convert_error(mapping, value))?;
                let fv = prefix::reverse_binary(encoded)?;
                check_tenant(tenant, &fv.tenant)?;
                restore_kind_bytes(mapping, fv.value)
            }
            ScalarKind::N => Err(Error::Unsupported(format!(
                "numeric physical field '{}' cannot carry a tenant prefix",
                mapping.source.name
            ))),
        }
    }
}

fn check_tenant(expected: &str, decoded: &str) -> Result<()> {
    if decoded != expected {
        return Err(Error::Corrupt(format!(
            "decoded tenant '{decoded}' does not match current tenant '{expected}'"
        )));
    }
    Ok(())
}

fn convert_error(mapping: &FieldMapping, value: &AttributeValue) -> Error {
    Error::Unsupported(format!(
        "attribute value {value:?} of kind {:?} could not be converted for field '{}'",
        mapping.source.kind, mapping.source.name
    ))
}

/// Extract the source value as a string per the declared source kind.
fn source_as_string(mapping: &FieldMapping, value: &AttributeValue) -> Result<String> {
    match mapping.source.kind {
        ScalarKind::S => value
            .as_s()
            .map(str::to_string)
            .ok_or_else(|| convert_error(mapping, value)),
        // Numbers coerce to their canonical decimal string.
        ScalarKind::N => value
            .as_n()
            .map(str::to_string)
            .ok_or_else(|| convert_error(mapping, value)),
        ScalarKind::B => Err(Error::Unsupported(format!(
            "binary field '{}' cannot be stored under a string physical column",
            mapping.source.name
        ))),
    }
}

/// Extract the source value as bytes per the declared source kind.
fn source_as_bytes(mapping: &FieldMapping, value: &AttributeValue) -> Result<Vec<u8>> {
    match mapping.source.kind {
        ScalarKind::B => value
            .as_b()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| convert_error(mapping, value)),
        ScalarKind::S => value
            .as_s()
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| convert_error(mapping, value)),
        ScalarKind::N => value
            .as_n()
            .map(|n| n.as_bytes().to_vec())
            .ok_or_else(|| convert_error(mapping, value)),
    }
}

/// Rebuild an attribute value of the target (virtual) kind from a decoded
/// string payload.
fn restore_kind_str(mapping: &FieldMapping, payload: &str) -> Result<AttributeValue> {
    match mapping.target.kind {
        ScalarKind::S => Ok(AttributeValue::S(payload.to_string())),
        ScalarKind::N => Ok(AttributeValue::N(payload.to_string())),
        ScalarKind::B => Ok(AttributeValue::B(payload.as_bytes().to_vec())),
    }
}

/// Rebuild an attribute value of the target (virtual) kind from decoded
/// payload bytes.
fn restore_kind_bytes(mapping: &FieldMapping, payload: Vec<u8>) -> Result<AttributeValue> {
    match mapping.target.kind {
        ScalarKind::B => Ok(AttributeValue::B(payload)),
        ScalarKind::S => String::from_utf8(payload)
            .map(AttributeValue::S)
            .map_err(|_| Error::Corrupt(format!("field '{}' is not UTF-8", mapping.target.name))),
        ScalarKind::N => String::from_utf8(payload)
            .map(AttributeValue::N)
            .map_err(|_| Error::Corrupt(format!("field '{}' is not UTF-8", mapping.target.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source_kind: ScalarKind, target_kind: ScalarKind, context_aware: bool) -> FieldMapping {
        FieldMapping {
            source: MappedField::new("source_field", source_kind),
            target: MappedField::new("target_field", target_kind),
            virtual_index_name: "virtual_table".to_string(),
            physical_index_name: "physical_table".to_string(),
            index_type: IndexType::Table,
            context_aware,
        }
    }

    fn assert_roundtrip(m: FieldMapping, value: AttributeValue, expected_physical: AttributeValue) {
        let applied = FieldMapper::apply("ctx", &m, &value).unwrap();
        assert_eq!(applied, expected_physical);
        let restored = FieldMapper::reverse("ctx", &m.reversed(), &applied).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_apply_string_table_index() {
        assert_roundtrip(
            mapping(ScalarKind::S, ScalarKind::S, true),
            AttributeValue::s("value"),
            AttributeValue::s("ctx.virtual_table.value"),
        );
    }

    #[test]
    fn test_apply_secondary_index() {
        let mut m = mapping(ScalarKind::S, ScalarKind::S, true);
        m.index_type = IndexType::SecondaryIndex;
        m.virtual_index_name = "virtual_index".to_string();
        assert_roundtrip(
            m,
            AttributeValue::s("value"),
            AttributeValue::s("ctx.virtual_index.value"),
        );
    }

    #[test]
    fn test_apply_number_to_string_column() {
        assert_roundtrip(
            mapping(ScalarKind::N, ScalarKind::S, true),
            AttributeValue::n("123"),
            AttributeValue::s("ctx.virtual_table.123"),
        );
    }

    #[test]
    fn test_apply_binary() {
        assert_roundtrip(
            mapping(ScalarKind::B, ScalarKind::B, true),
            AttributeValue::b(*b"byte_buffer"),
            AttributeValue::b(*b"ctx.virtual_table.byte_buffer"),
        );
    }

    #[test]
    fn test_apply_non_context_aware_passes_value_through() {
        assert_roundtrip(
            mapping(ScalarKind::N, ScalarKind::N, false),
            AttributeValue::n("42"),
            AttributeValue::n("42"),
        );
    }

    #[test]
    fn test_apply_wrong_source_kind() {
        let m = mapping(ScalarKind::N, ScalarKind::S, true);
        let err = FieldMapper::apply("ctx", &m, &AttributeValue::s("value")).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_apply_composite_value_rejected() {
        let m = mapping(ScalarKind::S, ScalarKind::S, true);
        let err = FieldMapper::apply("ctx", &m, &AttributeValue::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_reverse_tenant_mismatch() {
        let m = mapping(ScalarKind::S, ScalarKind::S, true);
        let applied = FieldMapper::apply("ctx", &m, &AttributeValue::s("v")).unwrap();
        let err = FieldMapper::reverse("other", &m.reversed(), &applied).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_reverse_missing_delimiters() {
        let m = mapping(ScalarKind::S, ScalarKind::S, true);
        let err = FieldMapper::reverse("ctx", &m.reversed(), &AttributeValue::s("bare")).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_payload_with_delimiter_roundtrips() {
        assert_roundtrip(
            mapping(ScalarKind::S, ScalarKind::S, true),
            AttributeValue::s("a.b"),
            AttributeValue::s("ctx.virtual_table.a.b"),
        );
    }
}
