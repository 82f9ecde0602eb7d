//! Field expression evaluation
//!
//! Evaluates a [`FieldDefinition`] against a JSON document and a local flat
//! variable mapping, producing flat entries keyed by the field name. References
//! the local mapping cannot answer are handed to an optional [`VariableLookup`]
//! (the running workflow instance).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::coercion::{convert_type, stringify};
use super::field::{ExpressionType, FieldDefinition, FieldType};
use super::flatten::{flatten, flatten_into, unflatten_object, FlatMap};
use super::json_path;
use super::path::{index_key, join_key};
use crate::domain::workflow::WorkflowError;

/// `{name}` placeholders in interpolation templates
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Resolves references outside the local variable mapping
pub trait VariableLookup: Send + Sync {
    fn lookup(&self, reference: &str) -> Result<Value, WorkflowError>;
}

/// Evaluate `field` against `document` and `variables` only
pub fn parse_field_value(
    document: &Value,
    variables: &FlatMap,
    field: &FieldDefinition,
) -> Result<FlatMap, WorkflowError> {
    ExpressionEvaluator::new(document, variables).parse_field_value(field)
}

/// Evaluator bound to one document and variable scope
#[derive(Clone, Copy)]
pub struct ExpressionEvaluator<'a> {
    document: &'a Value,
    variables: &'a FlatMap,
    fallback: Option<&'a dyn VariableLookup>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(document: &'a Value, variables: &'a FlatMap) -> Self {
        Self {
            document,
            variables,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, lookup: &'a dyn VariableLookup) -> Self {
        self.fallback = Some(lookup);
        self
    }

    /// Flat entries for a single field, keyed under its name
    pub fn parse_field_value(&self, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        self.evaluate(&field.name, field)
    }

    /// Evaluate a field list and rebuild the merged result as an object
    pub fn evaluate_fields(&self, fields: &[FieldDefinition]) -> Result<Value, WorkflowError> {
        let mut merged = FlatMap::new();
        for field in fields {
            merged.extend(self.parse_field_value(field)?);
        }
        unflatten_object(&merged)
    }

    /// Replace `{name}` placeholders; unresolvable ones are left as written
    pub fn interpolate(&self, template: &str) -> String {
        PLACEHOLDER_PATTERN
            .replace_all(template, |caps: &regex::Captures| {
                let name = caps[1].trim();
                match self.resolve(name) {
                    Ok(value) => stringify(&value),
                    Err(_) => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn evaluate(&self, key: &str, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        match field.expression.expression_type {
            ExpressionType::Fixed => self.fixed(key, field),
            ExpressionType::Variable => self.variable(key, field),
            ExpressionType::JsonPath => self.json_path(key, field),
            ExpressionType::StringInterpolation => {
                let text = self.interpolate(&field.expression.value);
                typed_entry(key, field.field_type, Value::String(text))
            }
            ExpressionType::Regex => self.regex(key, field),
            ExpressionType::Dynamic => typed_entry(key, field.field_type, self.document.clone()),
        }
    }

    fn fixed(&self, key: &str, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        if !field.children.is_empty() {
            let mut out = FlatMap::new();
            for (index, child) in field.children.iter().enumerate() {
                let child_key = if field.field_type == FieldType::Array {
                    index_key(key, index)
                } else {
                    join_key(key, &child.name)
                };
                out.extend(self.evaluate(&child_key, child)?);
            }
            return Ok(out);
        }

        let raw = field.expression.value.trim();
        if field.field_type.is_structural() {
            let parsed = if raw.is_empty() {
                empty_structure(field.field_type)
            } else {
                serde_json::from_str(raw)
                    .map_err(|_| WorkflowError::type_conversion(raw, field.field_type))?
            };
            return Ok(flatten(key, &parsed));
        }

        if raw.is_empty() && field.field_type != FieldType::String {
            return Ok(FlatMap::from([(key.to_string(), Value::Null)]));
        }

        typed_entry(
            key,
            field.field_type,
            Value::String(field.expression.value.clone()),
        )
    }

    fn variable(&self, key: &str, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        let reference = field.expression.value.trim();
        if reference.is_empty() {
            return Err(WorkflowError::invalid_reference(
                reference,
                format!("field '{}' has an empty variable reference", field.name),
            ));
        }

        if field.field_type.is_structural() {
            let copied = self.copy_prefixed(reference, key);
            if !copied.is_empty() {
                return Ok(copied);
            }
            return Ok(flatten(key, &self.resolve(reference)?));
        }

        typed_entry(key, field.field_type, self.resolve(reference)?)
    }

    fn json_path(&self, key: &str, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        let path = field.expression.value.trim();
        let matches = json_path::select(self.document, path)?;

        match field.field_type {
            FieldType::Array => {
                let value = if matches.len() == 1 && matches[0].is_array() {
                    matches[0].clone()
                } else {
                    Value::Array(matches.into_iter().cloned().collect())
                };
                Ok(flatten(key, &value))
            }
            FieldType::Object | FieldType::Map => {
                let mut out = FlatMap::new();
                for matched in matches {
                    flatten_into(key, matched, &mut out);
                }
                Ok(out)
            }
            scalar => {
                let first = matches
                    .into_iter()
                    .next()
                    .ok_or_else(|| WorkflowError::property_not_found(path, key))?;
                typed_entry(key, scalar, first.clone())
            }
        }
    }

    fn regex(&self, key: &str, field: &FieldDefinition) -> Result<FlatMap, WorkflowError> {
        let pattern = &field.expression.value;
        let regex = Regex::new(pattern).map_err(|e| {
            WorkflowError::definition_invalid(format!(
                "field '{}' has an invalid regex '{}': {}",
                field.name, pattern, e
            ))
        })?;

        let text = stringify(self.document);
        let extracted = regex
            .captures(&text)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        typed_entry(key, field.field_type, Value::String(extracted))
    }

    /// Copy local entries under `reference` to `target`, rewriting the prefix
    fn copy_prefixed(&self, reference: &str, target: &str) -> FlatMap {
        self.variables
            .iter()
            .filter_map(|(key, value)| {
                let rest = key.strip_prefix(reference)?;
                let is_child = rest.is_empty() || rest.starts_with('.') || rest.starts_with('[');
                is_child.then(|| (format!("{}{}", target, rest), value.clone()))
            })
            .collect()
    }

    fn resolve(&self, reference: &str) -> Result<Value, WorkflowError> {
        if let Some(value) = self.variables.get(reference) {
            return Ok(value.clone());
        }

        match self.fallback {
            Some(lookup) => lookup.lookup(reference),
            None => Err(WorkflowError::property_not_found(reference, reference)),
        }
    }
}

fn typed_entry(key: &str, field_type: FieldType, value: Value) -> Result<FlatMap, WorkflowError> {
    if field_type.is_structural() {
        return Ok(flatten(key, &value));
    }
    Ok(FlatMap::from([(key.to_string(), convert_type(&value, field_type)?)]))
}

fn empty_structure(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Array => Value::Array(Vec::new()),
        _ => Value::Object(serde_json::Map::new()),
    }
}
