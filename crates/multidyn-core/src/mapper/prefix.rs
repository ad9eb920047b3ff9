//! Tenant key-prefix encoding.
//!
//! Every hash key value the layer writes is of the form
//! `<tenant><DELIM><virtual-table-or-index-name><DELIM><original-value>`,
//! where the delimiter is `'.'` for strings and byte `0x2E` for binary.
//! The original value bytes follow the final delimiter verbatim, so
//! `reverse(apply(v)) == v` holds for any payload, including payloads that
//! themselves contain the delimiter.

use crate::error::{Error, Result};

/// Delimiter between tenant, qualifier, and value in string form.
pub const DELIMITER: char = '.';

/// Delimiter between tenant, qualifier, and value in binary form.
pub const DELIMITER_BYTE: u8 = 0x2E;

/// A decoded tenant-qualified value: the tenant, the virtual table or index
/// name the value was written under, and the original value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue<T> {
    pub tenant: String,
    pub qualifier: String,
    pub value: T,
}

fn check_component(label: &str, component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::InvalidArgument(format!("{label} must not be empty")));
    }
    if component.contains(DELIMITER) {
        return Err(Error::InvalidArgument(format!(
            "{label} '{component}' must not contain '{DELIMITER}'"
        )));
    }
    Ok(())
}

/// Encode a string value under a tenant and virtual index qualifier.
pub fn apply_string(tenant: &str, qualifier: &str, value: &str) -> Result<String> {
    check_component("tenant", tenant)?;
    check_component("virtual index name", qualifier)?;
    Ok(format!("{tenant}{DELIMITER}{qualifier}{DELIMITER}{value}"))
}

/// Decode a string value. Everything after the second delimiter is the
/// original value.
pub fn reverse_string(encoded: &str) -> Result<FieldValue<String>> {
    let (tenant, rest) = encoded
        .split_once(DELIMITER)
        .ok_or_else(|| Error::Corrupt(format!("missing tenant delimiter in '{encoded}'")))?;
    let (qualifier, value) = rest
        .split_once(DELIMITER)
        .ok_or_else(|| Error::Corrupt(format!("missing qualifier delimiter in '{encoded}'")))?;
    Ok(FieldValue {
        tenant: tenant.to_string(),
        qualifier: qualifier.to_string(),
        value: value.to_string(),
    })
}

/// Encode a binary value: UTF-8 of `<tenant>.<qualifier>.` followed by the
/// raw value bytes.
pub fn apply_binary(tenant: &str, qualifier: &str, value: &[u8]) -> Result<Vec<u8>> {
    check_component("tenant", tenant)?;
    check_component("virtual index name", qualifier)?;
    let mut out = Vec::with_capacity(tenant.len() + qualifier.len() + 2 + value.len());
    out.extend_from_slice(tenant.as_bytes());
    out.push(DELIMITER_BYTE);
    out.extend_from_slice(qualifier.as_bytes());
    out.push(DELIMITER_BYTE);
    out.extend_from_slice(value);
    Ok(out)
}

/// Decode a binary value. The tail after the second delimiter byte passes
/// through untouched.
pub fn reverse_binary(encoded: &[u8]) -> Result<FieldValue<Vec<u8>>> {
    let first = encoded
        .iter()
        .position(|&b| b == DELIMITER_BYTE)
        .ok_or_else(|| Error::Corrupt("missing tenant delimiter in binary value".to_string()))?;
    let second_rel = encoded[first + 1..]
        .iter()
        .position(|&b| b == DELIMITER_BYTE)
        .ok_or_else(|| Error::Corrupt("missing qualifier delimiter in binary value".to_string()))?;
    let second = first + 1 + second_rel;

    let tenant = std::str::from_utf8(&encoded[..first])
        .map_err(|_| Error::Corrupt("tenant prefix is not UTF-8".to_string()))?;
    let qualifier = std::str::from_utf8(&encoded[first + 1..second])
        .map_err(|_| Error::Corrupt("qualifier prefix is not UTF-8".to_string()))?;

    Ok(FieldValue {
        tenant: tenant.to_string(),
        qualifier: qualifier.to_string(),
        value: encoded[second + 1..].to_vec(),
    })
}

/// The string prefix (including the trailing delimiter) shared by every
/// value a tenant writes under a qualifier. Used to constrain scans.
pub fn string_prefix(tenant: &str, qualifier: &str) -> Result<String> {
    check_component("tenant", tenant)?;
    check_component("virtual index name", qualifier)?;
    Ok(format!("{tenant}{DELIMITER}{qualifier}{DELIMITER}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // String form
    // -----------------------------------------------------------------------

    #[test]
    fn test_string_roundtrip() {
        let encoded = apply_string("t1", "V", "a").unwrap();
        assert_eq!(encoded, "t1.V.a");
        let fv = reverse_string(&encoded).unwrap();
        assert_eq!(fv.tenant, "t1");
        assert_eq!(fv.qualifier, "V");
        assert_eq!(fv.value, "a");
    }

    #[test]
    fn test_string_value_may_contain_delimiter() {
        let encoded = apply_string("t1", "V", "a.b.c").unwrap();
        let fv = reverse_string(&encoded).unwrap();
        assert_eq!(fv.value, "a.b.c");
    }

    #[test]
    fn test_empty_string_value_roundtrips() {
        let encoded = apply_string("t1", "V", "").unwrap();
        assert_eq!(encoded, "t1.V.");
        assert_eq!(reverse_string(&encoded).unwrap().value, "");
    }

    #[test]
    fn test_delimiter_in_tenant_rejected() {
        assert!(matches!(
            apply_string("t.1", "V", "a"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            apply_string("t1", "V.2", "a"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reverse_requires_two_delimiters() {
        assert!(matches!(reverse_string("nodelims"), Err(Error::Corrupt(_))));
        assert!(matches!(reverse_string("t1.rest"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_distinct_tenants_encode_distinct() {
        let a = apply_string("t1", "V", "a").unwrap();
        let b = apply_string("t2", "V", "a").unwrap();
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // Binary form
    // -----------------------------------------------------------------------

    #[test]
    fn test_binary_roundtrip() {
        let encoded = apply_binary("t1", "V", &[0xFF, 0x00, 0x2E]).unwrap();
        let fv = reverse_binary(&encoded).unwrap();
        assert_eq!(fv.tenant, "t1");
        assert_eq!(fv.qualifier, "V");
        // Payload bytes pass through untouched, delimiter byte included.
        assert_eq!(fv.value, vec![0xFF, 0x00, 0x2E]);
    }

    #[test]
    fn test_zero_length_binary_roundtrips() {
        let encoded = apply_binary("t1", "V", &[]).unwrap();
        assert_eq!(reverse_binary(&encoded).unwrap().value, Vec::<u8>::new());
    }

    #[test]
    fn test_binary_layout() {
        let encoded = apply_binary("t", "x", &[7]).unwrap();
        assert_eq!(encoded, vec![b't', 0x2E, b'x', 0x2E, 7]);
    }

    #[test]
    fn test_string_prefix() {
        assert_eq!(string_prefix("t1", "V").unwrap(), "t1.V.");
    }
}
