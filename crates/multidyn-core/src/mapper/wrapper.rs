//! Capability view over the requests that carry condition expressions.
//!
//! Condition rewriting is generic across request shapes whose "primary
//! expression" slot has different names (update expression on Update,
//! condition expression elsewhere) and whose ancillary fields overlap only
//! partially. Each request type gets a thin wrapper; capabilities that do
//! not apply to a carrier answer [`Error::Unsupported`].

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::request::{
    DeleteItemRequest, PutItemRequest, QueryRequest, ScanRequest, UpdateItemRequest,
};
use crate::types::{AttributeValue, Condition, Item};

/// The capability set condition rewriting works against.
///
/// Accessors return owned snapshots so callers can read and mutate through
/// the same wrapper without aliasing.
pub trait RequestWrapper {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>>;
    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str);

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue>;
    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue);

    /// Update expression on Update requests, condition expression otherwise.
    fn primary_expression(&self) -> Option<String>;
    fn set_primary_expression(&mut self, expression: String);

    /// A separate condition expression where the request carries one.
    fn filter_expression(&self) -> Option<String>;
    fn set_filter_expression(&mut self, expression: String);

    /// Legacy `{attribute -> Condition}` map.
    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Err(Error::Unsupported(
            "legacy conditions do not apply to this request".to_string(),
        ))
    }

    fn set_legacy_conditions(&mut self, _conditions: HashMap<String, Condition>) -> Result<()> {
        Err(Error::Unsupported(
            "legacy conditions do not apply to this request".to_string(),
        ))
    }

    fn index_name(&self) -> Result<Option<String>> {
        Err(Error::Unsupported(
            "index name does not apply to this request".to_string(),
        ))
    }

    fn set_index_name(&mut self, _index_name: String) -> Result<()> {
        Err(Error::Unsupported(
            "index name does not apply to this request".to_string(),
        ))
    }

    fn exclusive_start_key(&self) -> Result<Option<Item>> {
        Err(Error::Unsupported(
            "exclusive start key does not apply to this request".to_string(),
        ))
    }

    fn set_exclusive_start_key(&mut self, _key: Item) -> Result<()> {
        Err(Error::Unsupported(
            "exclusive start key does not apply to this request".to_string(),
        ))
    }
}

fn put_name(names: &mut Option<HashMap<String, String>>, placeholder: &str, field: &str) {
    names
        .get_or_insert_with(HashMap::new)
        .insert(placeholder.to_string(), field.to_string());
}

fn put_value(
    values: &mut Option<HashMap<String, AttributeValue>>,
    placeholder: &str,
    value: AttributeValue,
) {
    values
        .get_or_insert_with(HashMap::new)
        .insert(placeholder.to_string(), value);
}

pub struct PutRequestWrapper<'a>(pub &'a mut PutItemRequest);

impl RequestWrapper for PutRequestWrapper<'_> {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>> {
        self.0.expression_attribute_names.clone()
    }

    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str) {
        put_name(&mut self.0.expression_attribute_names, placeholder, field);
    }

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue> {
        self.0
            .expression_attribute_values
            .as_ref()
            .and_then(|values| values.get(placeholder).cloned())
    }

    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue) {
        put_value(&mut self.0.expression_attribute_values, placeholder, value);
    }

    fn primary_expression(&self) -> Option<String> {
        self.0.condition_expression.clone()
    }

    fn set_primary_expression(&mut self, expression: String) {
        self.0.condition_expression = Some(expression);
    }

    fn filter_expression(&self) -> Option<String> {
        None
    }

    fn set_filter_expression(&mut self, _expression: String) {}

    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Ok(self.0.expected.clone())
    }

    fn set_legacy_conditions(&mut self, conditions: HashMap<String, Condition>) -> Result<()> {
        self.0.expected = Some(conditions);
        Ok(())
    }
}

pub struct UpdateRequestWrapper<'a>(pub &'a mut UpdateItemRequest);

impl RequestWrapper for UpdateRequestWrapper<'_> {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>> {
        self.0.expression_attribute_names.clone()
    }

    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str) {
        put_name(&mut self.0.expression_attribute_names, placeholder, field);
    }

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue> {
        self.0
            .expression_attribute_values
            .as_ref()
            .and_then(|values| values.get(placeholder).cloned())
    }

    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue) {
        put_value(&mut self.0.expression_attribute_values, placeholder, value);
    }

    fn primary_expression(&self) -> Option<String> {
        self.0.update_expression.clone()
    }

    fn set_primary_expression(&mut self, expression: String) {
        self.0.update_expression = Some(expression);
    }

    fn filter_expression(&self) -> Option<String> {
        self.0.condition_expression.clone()
    }

    fn set_filter_expression(&mut self, expression: String) {
        self.0.condition_expression = Some(expression);
    }

    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Ok(self.0.expected.clone())
    }

    fn set_legacy_conditions(&mut self, conditions: HashMap<String, Condition>) -> Result<()> {
        self.0.expected = Some(conditions);
        Ok(())
    }
}

pub struct DeleteRequestWrapper<'a>(pub &'a mut DeleteItemRequest);

impl RequestWrapper for DeleteRequestWrapper<'_> {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>> {
        self.0.expression_attribute_names.clone()
    }

    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str) {
        put_name(&mut self.0.expression_attribute_names, placeholder, field);
    }

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue> {
        self.0
            .expression_attribute_values
            .as_ref()
            .and_then(|values| values.get(placeholder).cloned())
    }

    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue) {
        put_value(&mut self.0.expression_attribute_values, placeholder, value);
    }

    fn primary_expression(&self) -> Option<String> {
        self.0.condition_expression.clone()
    }

    fn set_primary_expression(&mut self, expression: String) {
        self.0.condition_expression = Some(expression);
    }

    // No filter expression exists on Delete.
    fn filter_expression(&self) -> Option<String> {
        None
    }

    fn set_filter_expression(&mut self, _expression: String) {}

    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Ok(self.0.expected.clone())
    }

    fn set_legacy_conditions(&mut self, conditions: HashMap<String, Condition>) -> Result<()> {
        self.0.expected = Some(conditions);
        Ok(())
    }
}

pub struct QueryRequestWrapper<'a>(pub &'a mut QueryRequest);

impl RequestWrapper for QueryRequestWrapper<'_> {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>> {
        self.0.expression_attribute_names.clone()
    }

    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str) {
        put_name(&mut self.0.expression_attribute_names, placeholder, field);
    }

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue> {
        self.0
            .expression_attribute_values
            .as_ref()
            .and_then(|values| values.get(placeholder).cloned())
    }

    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue) {
        put_value(&mut self.0.expression_attribute_values, placeholder, value);
    }

    fn primary_expression(&self) -> Option<String> {
        self.0.key_condition_expression.clone()
    }

    fn set_primary_expression(&mut self, expression: String) {
        self.0.key_condition_expression = Some(expression);
    }

    fn filter_expression(&self) -> Option<String> {
        self.0.filter_expression.clone()
    }

    fn set_filter_expression(&mut self, expression: String) {
        self.0.filter_expression = Some(expression);
    }

    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Ok(self.0.key_conditions.clone())
    }

    fn set_legacy_conditions(&mut self, conditions: HashMap<String, Condition>) -> Result<()> {
        self.0.key_conditions = Some(conditions);
        Ok(())
    }

    fn index_name(&self) -> Result<Option<String>> {
        Ok(self.0.index_name.clone())
    }

    fn set_index_name(&mut self, index_name: String) -> Result<()> {
        self.0.index_name = Some(index_name);
        Ok(())
    }

    fn exclusive_start_key(&self) -> Result<Option<Item>> {
        Ok(self.0.exclusive_start_key.clone())
    }

    fn set_exclusive_start_key(&mut self, key: Item) -> Result<()> {
        self.0.exclusive_start_key = Some(key);
        Ok(())
    }
}

pub struct ScanRequestWrapper<'a>(pub &'a mut ScanRequest);

impl RequestWrapper for ScanRequestWrapper<'_> {
    fn expression_attribute_names(&self) -> Option<HashMap<String, String>> {
        self.0.expression_attribute_names.clone()
    }

    fn put_expression_attribute_name(&mut self, placeholder: &str, field: &str) {
        put_name(&mut self.0.expression_attribute_names, placeholder, field);
    }

    fn expression_attribute_value(&self, placeholder: &str) -> Option<AttributeValue> {
        self.0
            .expression_attribute_values
            .as_ref()
            .and_then(|values| values.get(placeholder).cloned())
    }

    fn put_expression_attribute_value(&mut self, placeholder: &str, value: AttributeValue) {
        put_value(&mut self.0.expression_attribute_values, placeholder, value);
    }

    // A scan carries no key condition.
    fn primary_expression(&self) -> Option<String> {
        None
    }

    fn set_primary_expression(&mut self, _expression: String) {}

    fn filter_expression(&self) -> Option<String> {
        self.0.filter_expression.clone()
    }

    fn set_filter_expression(&mut self, expression: String) {
        self.0.filter_expression = Some(expression);
    }

    fn legacy_conditions(&self) -> Result<Option<HashMap<String, Condition>>> {
        Ok(self.0.scan_filter.clone())
    }

    fn set_legacy_conditions(&mut self, conditions: HashMap<String, Condition>) -> Result<()> {
        self.0.scan_filter = Some(conditions);
        Ok(())
    }

    fn index_name(&self) -> Result<Option<String>> {
        Ok(self.0.index_name.clone())
    }

    fn set_index_name(&mut self, index_name: String) -> Result<()> {
        self.0.index_name = Some(index_name);
        Ok(())
    }

    fn exclusive_start_key(&self) -> Result<Option<Item>> {
        Ok(self.0.exclusive_start_key.clone())
    }

    fn set_exclusive_start_key(&mut self, key: Item) -> Result<()> {
        self.0.exclusive_start_key = Some(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_wrapper_has_no_index_capability() {
        let mut request = PutItemRequest::default();
        let wrapper = PutRequestWrapper(&mut request);
        assert!(matches!(wrapper.index_name(), Err(Error::Unsupported(_))));
        assert!(matches!(
            wrapper.exclusive_start_key(),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_update_wrapper_slots() {
        let mut request = UpdateItemRequest {
            update_expression: Some("SET #a = :v".to_string()),
            condition_expression: Some("attribute_exists(#a)".to_string()),
            ..Default::default()
        };
        let wrapper = UpdateRequestWrapper(&mut request);
        assert_eq!(wrapper.primary_expression().as_deref(), Some("SET #a = :v"));
        assert_eq!(
            wrapper.filter_expression().as_deref(),
            Some("attribute_exists(#a)")
        );
    }

    #[test]
    fn test_delete_wrapper_has_no_filter() {
        let mut request = DeleteItemRequest {
            condition_expression: Some("attribute_exists(pk)".to_string()),
            ..Default::default()
        };
        let mut wrapper = DeleteRequestWrapper(&mut request);
        assert!(wrapper.filter_expression().is_none());
        wrapper.set_filter_expression("ignored".to_string());
        assert!(wrapper.filter_expression().is_none());
        assert_eq!(
            wrapper.primary_expression().as_deref(),
            Some("attribute_exists(pk)")
        );
    }

    #[test]
    fn test_put_name_and_value_create_maps_on_demand() {
        let mut request = QueryRequest::default();
        let mut wrapper = QueryRequestWrapper(&mut request);
        wrapper.put_expression_attribute_name("#k", "pk");
        wrapper.put_expression_attribute_value(":v", AttributeValue::s("x"));
        assert_eq!(
            request.expression_attribute_names.unwrap()["#k"],
            "pk".to_string()
        );
        assert_eq!(
            request.expression_attribute_values.unwrap()[":v"],
            AttributeValue::s("x")
        );
    }
}
