//! Condition-expression rewriting.
//!
//! Rewrites every reference to a mapped key attribute in a request's
//! expressions to the physical attribute name, and tenant-encodes every
//! value placeholder that an `=` comparison binds to a mapped key. Bare
//! field-name literals are first converted to expression-name placeholders
//! so the rename never collides with user text.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::mapping::TableMapping;
use crate::types::Condition;

use super::field::{FieldMapper, FieldMapping};
use super::wrapper::RequestWrapper;

/// Rewrites the primary expression, filter expression, and legacy condition
/// map of a wrapped request.
pub struct ConditionMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> ConditionMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    pub fn apply(&self, tenant: &str, request: &mut dyn RequestWrapper) -> Result<()> {
        self.check_legacy_overlap(request)?;
        self.convert_field_name_literals(request);
        for fm in self.mapping.field_mappings() {
            self.apply_to_field(tenant, fm, request)?;
        }
        self.rewrite_legacy(tenant, request)?;
        Ok(())
    }

    /// Legacy and expression forms must not target the same attribute.
    fn check_legacy_overlap(&self, request: &mut dyn RequestWrapper) -> Result<()> {
        let legacy = match request.legacy_conditions() {
            Ok(Some(map)) if !map.is_empty() => map,
            _ => return Ok(()),
        };
        let names = request.expression_attribute_names().unwrap_or_default();
        let expressions: Vec<String> = [request.primary_expression(), request.filter_expression()]
            .into_iter()
            .flatten()
            .collect();
        for attr in legacy.keys() {
            for expr in &expressions {
                if expression_references(expr, &names, attr) {
                    return Err(Error::InvalidArgument(format!(
                        "attribute '{attr}' is targeted by both a legacy condition and an expression"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replace bare occurrences of mapped field names with fresh
    /// expression-name placeholders, so the physical rename below happens in
    /// the alias table rather than in user text.
    fn convert_field_name_literals(&self, request: &mut dyn RequestWrapper) {
        let fields: Vec<String> = self
            .mapping
            .field_mappings()
            .map(|fm| fm.source.name.clone())
            .collect();
        let mut counter = 0usize;
        if let Some(expr) = request.primary_expression() {
            let rewritten = replace_literals(&fields, expr, request, &mut counter);
            request.set_primary_expression(rewritten);
        }
        if let Some(expr) = request.filter_expression() {
            let rewritten = replace_literals(&fields, expr, request, &mut counter);
            request.set_filter_expression(rewritten);
        }
    }

    /// Repoint every alias of one mapped field at the physical name and
    /// tenant-encode the value placeholders bound to it by `=` comparisons.
    fn apply_to_field(
        &self,
        tenant: &str,
        fm: &FieldMapping,
        request: &mut dyn RequestWrapper,
    ) -> Result<()> {
        let names = request.expression_attribute_names().unwrap_or_default();
        let aliases: Vec<String> = names
            .iter()
            .filter(|(_, field)| **field == fm.source.name)
            .map(|(alias, _)| alias.clone())
            .collect();
        if aliases.is_empty() {
            return Ok(());
        }

        // A placeholder may appear in more than one expression; encode once.
        let mut placeholders = HashSet::new();
        for expr in [request.primary_expression(), request.filter_expression()]
            .into_iter()
            .flatten()
        {
            for alias in &aliases {
                collect_eq_placeholders(&expr, alias, &mut placeholders);
            }
        }
        for placeholder in placeholders {
            if let Some(value) = request.expression_attribute_value(&placeholder) {
                let mapped = FieldMapper::apply(tenant, fm, &value)?;
                request.put_expression_attribute_value(&placeholder, mapped);
            }
        }

        for alias in &aliases {
            request.put_expression_attribute_name(alias, &fm.target.name);
        }
        Ok(())
    }

    fn rewrite_legacy(&self, tenant: &str, request: &mut dyn RequestWrapper) -> Result<()> {
        let legacy = match request.legacy_conditions() {
            Ok(Some(map)) if !map.is_empty() => map,
            _ => return Ok(()),
        };
        let mut rewritten = HashMap::with_capacity(legacy.len());
        for (attr, condition) in legacy {
            match self.mapping.field_mapping(&attr) {
                Some(fm) => {
                    let values = condition
                        .attribute_value_list
                        .iter()
                        .map(|v| FieldMapper::apply(tenant, fm, v))
                        .collect::<Result<Vec<_>>>()?;
                    rewritten.insert(
                        fm.target.name.clone(),
                        Condition {
                            comparison_operator: condition.comparison_operator,
                            attribute_value_list: values,
                        },
                    );
                }
                None => {
                    rewritten.insert(attr, condition);
                }
            }
        }
        request.set_legacy_conditions(rewritten)?;
        Ok(())
    }
}

fn replace_literals(
    fields: &[String],
    expression: String,
    request: &mut dyn RequestWrapper,
    counter: &mut usize,
) -> String {
    let mut out = expression;
    for field in fields {
        if !contains_token(&out, field) {
            continue;
        }
        let names = request.expression_attribute_names().unwrap_or_default();
        let alias = match names.iter().find(|(_, v)| *v == field) {
            Some((alias, _)) => alias.clone(),
            None => {
                let alias = fresh_placeholder(&names, counter);
                request.put_expression_attribute_name(&alias, field);
                alias
            }
        };
        out = replace_token(&out, field, &alias);
    }
    out
}

fn fresh_placeholder(names: &HashMap<String, String>, counter: &mut usize) -> String {
    loop {
        let candidate = format!("#field{}", *counter);
        *counter += 1;
        if !names.contains_key(&candidate) {
            return candidate;
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Token occurrences of `token` in `expression`: bounded by non-word
/// characters and not already a `#name` or `:value` placeholder.
fn token_positions(expression: &str, token: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let bytes = expression.as_bytes();
    let mut start = 0;
    while let Some(found) = expression[start..].find(token) {
        let at = start + found;
        let before_ok = at == 0 || {
            let prev = bytes[at - 1] as char;
            !is_word_char(prev) && prev != '#' && prev != ':'
        };
        let end = at + token.len();
        let after_ok = end >= bytes.len() || !is_word_char(bytes[end] as char);
        if before_ok && after_ok {
            positions.push(at);
        }
        start = at + token.len().max(1);
    }
    positions
}

fn contains_token(expression: &str, token: &str) -> bool {
    !token_positions(expression, token).is_empty()
}

fn replace_token(expression: &str, token: &str, replacement: &str) -> String {
    let positions = token_positions(expression, token);
    if positions.is_empty() {
        return expression.to_string();
    }
    let mut out = String::with_capacity(expression.len());
    let mut cursor = 0;
    for at in positions {
        out.push_str(&expression[cursor..at]);
        out.push_str(replacement);
        cursor = at + token.len();
    }
    out.push_str(&expression[cursor..]);
    out
}

/// Does the expression reference `attr`, either as a bare token or through
/// an alias in the names table?
fn expression_references(expression: &str, names: &HashMap<String, String>, attr: &str) -> bool {
    if contains_token(expression, attr) {
        return true;
    }
    names
        .iter()
        .any(|(alias, field)| field.as_str() == attr && expression.contains(alias.as_str()))
}

/// Collect the `:placeholder` bound to `alias` by an `=` comparison, e.g.
/// `#key = :value`. Other comparison shapes keep their values unchanged.
fn collect_eq_placeholders(expression: &str, alias: &str, out: &mut HashSet<String>) {
    let bytes = expression.as_bytes();
    let mut start = 0;
    while let Some(found) = expression[start..].find(alias) {
        let at = start + found;
        let mut cursor = at + alias.len();
        start = cursor;
        // Alias must end at a token boundary (`#k` must not match `#k2`).
        if cursor < bytes.len() && is_word_char(bytes[cursor] as char) {
            continue;
        }
        while cursor < bytes.len() && bytes[cursor] == b' ' {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] != b'=' {
            continue;
        }
        cursor += 1;
        while cursor < bytes.len() && bytes[cursor] == b' ' {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] != b':' {
            continue;
        }
        let value_start = cursor;
        cursor += 1;
        while cursor < bytes.len() && is_word_char(bytes[cursor] as char) {
            cursor += 1;
        }
        if cursor > value_start + 1 {
            out.insert(expression[value_start..cursor].to_string());
        }
    }
}
