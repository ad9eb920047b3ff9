//! Query and scan request rewriting.
//!
//! Resolves the target index, rewrites key-condition and filter expressions
//! through the condition mapper, substitutes the physical index name, maps
//! the exclusive start key, and constrains every scan to the caller's
//! tenant-prefixed hash key range.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mapping::TableMapping;
use crate::request::{QueryRequest, ScanRequest};
use crate::types::{AttributeValue, PrimaryKey, ScalarKind};

use super::prefix;
use super::wrapper::{QueryRequestWrapper, RequestWrapper, ScanRequestWrapper};

/// Expression-name placeholder for the injected tenant filter.
pub const NAME_PLACEHOLDER: &str = "#___name___";

/// Expression-value placeholder for the injected tenant filter.
pub const VALUE_PLACEHOLDER: &str = ":___value___";

pub struct QueryAndScanMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> QueryAndScanMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    /// Rewrite a query in place (table name excluded; the caller maps it).
    pub fn apply_query(&self, tenant: &str, request: &mut QueryRequest) -> Result<()> {
        let mut wrapper = QueryRequestWrapper(request);
        self.apply_common(tenant, &mut wrapper)?;
        if let Some(start_key) = wrapper.exclusive_start_key()? {
            let mapped = self.mapping.item_mapper().apply(tenant, &start_key)?;
            wrapper.set_exclusive_start_key(mapped)?;
        }
        Ok(())
    }

    /// Rewrite a scan in place and AND a tenant-prefix predicate onto its
    /// filter, so the scan never returns other tenants' rows.
    pub fn apply_scan(&self, tenant: &str, request: &mut ScanRequest) -> Result<()> {
        let target = self.mapping.target_index(request.index_name.as_deref())?;
        check_projection_contains_key(request, target.virtual_key)?;

        let physical_hash = target.physical_hash.clone();
        let hash_prefix = prefix::string_prefix(tenant, target.qualifier)?;

        let mut wrapper = ScanRequestWrapper(request);
        self.apply_common(tenant, &mut wrapper)?;

        // A cursor handed back after a soft-limit page is already in
        // physical form (it may point at another tenant's row, which has no
        // virtual spelling); pass it through. Results stay tenant-filtered
        // either way.
        if let Some(start_key) = wrapper.exclusive_start_key()? {
            if !start_key.contains_key(&physical_hash.name) {
                let mapped = self.mapping.item_mapper().apply(tenant, &start_key)?;
                wrapper.set_exclusive_start_key(mapped)?;
            }
        }

        let prefix_value = match physical_hash.kind {
            ScalarKind::S => AttributeValue::S(hash_prefix),
            ScalarKind::B => AttributeValue::B(hash_prefix.into_bytes()),
            ScalarKind::N => {
                return Err(Error::Internal(format!(
                    "physical hash key '{}' has numeric kind",
                    physical_hash.name
                )))
            }
        };
        wrapper.put_expression_attribute_name(NAME_PLACEHOLDER, &physical_hash.name);
        wrapper.put_expression_attribute_value(VALUE_PLACEHOLDER, prefix_value);

        let tenant_filter = format!("begins_with({NAME_PLACEHOLDER}, {VALUE_PLACEHOLDER})");
        let combined = match wrapper.filter_expression() {
            Some(user_filter) => format!("{tenant_filter} AND ({user_filter})"),
            None => tenant_filter,
        };
        wrapper.set_filter_expression(combined);
        Ok(())
    }

    fn apply_common(&self, tenant: &str, wrapper: &mut dyn RequestWrapper) -> Result<()> {
        if let Some(virtual_index) = wrapper.index_name()? {
            let index_mapping = self.mapping.index_mapping(&virtual_index)?;
            wrapper.set_index_name(index_mapping.physical_name.clone())?;
        }
        self.mapping.condition_mapper().apply(tenant, wrapper)
    }
}

/// The projection must include the target index's key attributes, since the
/// paging cursor is derived from returned items.
///
/// The containment check is a plain substring / membership test over the
/// expression text and the expression-attribute-names alias table, not a
/// full parser: an attribute name that is a substring of another can
/// satisfy it.
fn check_projection_contains_key(request: &ScanRequest, key: &PrimaryKey) -> Result<()> {
    if request.projection_expression.is_none() && request.attributes_to_get.is_none() {
        return Ok(());
    }
    for name in key.attribute_names() {
        if !projection_contains(request, name) {
            return Err(Error::InvalidArgument(format!(
                "multitenant scans must include key attribute '{name}' in the projection"
            )));
        }
    }
    Ok(())
}

fn projection_contains(request: &ScanRequest, attr: &str) -> bool {
    if let Some(projection) = &request.projection_expression {
        if let Some(alias) = alias_for(request.expression_attribute_names.as_ref(), attr) {
            if projection.contains(alias) {
                return true;
            }
        }
        if projection.contains(attr) {
            return true;
        }
    }
    request
        .attributes_to_get
        .as_ref()
        .is_some_and(|attrs| attrs.iter().any(|a| a == attr))
}

fn alias_for<'a>(names: Option<&'a HashMap<String, String>>, attr: &str) -> Option<&'a str> {
    names?
        .iter()
        .find(|(_, field)| field.as_str() == attr)
        .map(|(alias, _)| alias.as_str())
}
