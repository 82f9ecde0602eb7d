//! Field evaluation shared by the node runtimes

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::expression::{
    flatten, stringify, unflatten_object, ExpressionEvaluator, FieldDefinition, FlatMap,
};
use crate::domain::workflow::{WorkflowContext, WorkflowError};

/// Evaluate input fields against everything the instance has produced so far
pub(super) fn resolve_inputs(
    fields: &[FieldDefinition],
    context: &WorkflowContext,
) -> Result<Value, WorkflowError> {
    let document = context.document();
    ExpressionEvaluator::new(&document, context.flatten_variables())
        .with_fallback(context)
        .evaluate_fields(fields)
}

/// Evaluate a single field and return its value
pub(super) fn resolve_field(
    field: &FieldDefinition,
    context: &WorkflowContext,
) -> Result<Value, WorkflowError> {
    let document = context.document();
    let flat = ExpressionEvaluator::new(&document, context.flatten_variables())
        .with_fallback(context)
        .parse_field_value(field)?;

    if let Some(value) = flat.get(&field.name) {
        return Ok(value.clone());
    }
    Ok(unflatten_object(&flat)?
        .get(&field.name)
        .cloned()
        .unwrap_or(Value::Null))
}

/// Header fields as name/value strings
pub(super) fn resolve_headers(
    fields: &[FieldDefinition],
    context: &WorkflowContext,
) -> Result<BTreeMap<String, String>, WorkflowError> {
    let resolved = resolve_inputs(fields, context)?;
    Ok(resolved
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .map(|(name, value)| (name.clone(), stringify(value)))
                .collect()
        })
        .unwrap_or_default())
}

/// Derive declared output fields from a node's raw result
///
/// The result is visible as a parsed tree (JsonPath, Regex) and flattened
/// (Variable, StringInterpolation); anything else falls back to the instance.
/// No declared fields passes the result through.
pub(super) fn derive_outputs(
    fields: &[FieldDefinition],
    document: &Value,
    context: &WorkflowContext,
) -> Result<Value, WorkflowError> {
    if fields.is_empty() {
        return Ok(document.clone());
    }

    let variables: FlatMap = flatten("", document);
    ExpressionEvaluator::new(document, &variables)
        .with_fallback(context)
        .evaluate_fields(fields)
}

/// Substitute `{reference}` placeholders from the instance
pub(super) fn interpolate(template: &str, context: &WorkflowContext) -> String {
    let document = context.document();
    ExpressionEvaluator::new(&document, context.flatten_variables())
        .with_fallback(context)
        .interpolate(template)
}
