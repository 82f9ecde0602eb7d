//! Variable reference resolution against a running instance
//!
//! References take the form `prefix.path`:
//! - `sys.user_id` - system variables
//! - `input.items[0].name` - startup parameters
//! - `nodeA.items[*].price` - output of an executed node; `[*]` fans out
//!
//! A bare name (`name`) that is not an executed node reads as `input.name`.

use serde_json::Value;

use super::context::WorkflowContext;
use super::error::WorkflowError;
use crate::domain::expression::{parse_path, PathSegment, VariableLookup};

/// Prefix addressing system variables
pub const SYS_PREFIX: &str = "sys";

/// Prefix addressing startup parameters
pub const INPUT_PREFIX: &str = "input";

/// A parsed `prefix.path` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    pub prefix: String,
    pub path: Vec<PathSegment>,
}

impl VariableReference {
    pub fn parse(reference: &str) -> Result<Self, WorkflowError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::invalid_reference(reference, "reference is empty"));
        }

        let mut segments = parse_path(trimmed)
            .map_err(|message| WorkflowError::invalid_reference(reference, message))?;

        match segments.first() {
            Some(PathSegment::Property(_)) => {}
            _ => {
                return Err(WorkflowError::invalid_reference(
                    reference,
                    "reference must start with sys, input or a node key",
                ));
            }
        }

        let PathSegment::Property(prefix) = segments.remove(0) else {
            return Err(WorkflowError::invalid_reference(reference, "missing prefix"));
        };

        Ok(Self {
            prefix,
            path: segments,
        })
    }

    pub fn has_wildcard(&self) -> bool {
        self.path.contains(&PathSegment::Wildcard)
    }
}

/// Resolve a reference to a value
///
/// Node references are only answered for nodes that already executed, even if
/// the flat mapping happens to hold a matching key.
pub fn resolve_variable(reference: &str, context: &WorkflowContext) -> Result<Value, WorkflowError> {
    let parsed = VariableReference::parse(reference)?;
    let key = reference.trim();

    match parsed.prefix.as_str() {
        SYS_PREFIX => {
            if let Some(value) = direct_hit(context, key, &parsed) {
                return Ok(value);
            }
            walk(&Value::Object(context.system_variables().clone()), &parsed.path, key)
        }
        INPUT_PREFIX => {
            if let Some(value) = direct_hit(context, key, &parsed) {
                return Ok(value);
            }
            walk(&Value::Object(context.runtime_parameters().clone()), &parsed.path, key)
        }
        node_key => {
            if !context.is_executed(node_key) {
                return Err(WorkflowError::node_not_executed(node_key));
            }
            if let Some(value) = direct_hit(context, key, &parsed) {
                return Ok(value);
            }
            let document = context
                .node_output(node_key)
                .ok_or_else(|| WorkflowError::node_not_executed(node_key))?;
            walk(document, &parsed.path, key)
        }
    }
}

fn direct_hit(context: &WorkflowContext, key: &str, parsed: &VariableReference) -> Option<Value> {
    if parsed.has_wildcard() {
        return None;
    }
    context.flatten_variables().get(key).cloned()
}

fn walk(current: &Value, segments: &[PathSegment], reference: &str) -> Result<Value, WorkflowError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(current.clone());
    };

    match segment {
        PathSegment::Property(name) => match current.as_object().and_then(|map| map.get(name)) {
            Some(child) => walk(child, rest, reference),
            None => Err(WorkflowError::property_not_found(reference, name)),
        },
        PathSegment::Index(index) => match current {
            Value::Array(items) => match items.get(*index) {
                Some(item) => walk(item, rest, reference),
                None => Err(WorkflowError::index_out_of_range(
                    reference,
                    format!("index {} exceeds length {}", index, items.len()),
                )),
            },
            _ => Err(WorkflowError::index_out_of_range(
                reference,
                format!("index {} applied to a non-array value", index),
            )),
        },
        PathSegment::Wildcard => match current {
            Value::Array(items) => items
                .iter()
                .map(|item| walk(item, rest, reference))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(WorkflowError::index_out_of_range(
                reference,
                "wildcard applied to a non-array value",
            )),
        },
    }
}

impl VariableLookup for WorkflowContext {
    fn lookup(&self, reference: &str) -> Result<Value, WorkflowError> {
        match resolve_variable(reference, self) {
            Err(WorkflowError::NodeNotExecuted(node)) if is_bare(reference) => {
                resolve_variable(&format!("{}.{}", INPUT_PREFIX, reference.trim()), self)
                    .map_err(|_| WorkflowError::node_not_executed(node))
            }
            other => other,
        }
    }
}

fn is_bare(reference: &str) -> bool {
    let trimmed = reference.trim();
    !trimmed.is_empty() && !trimmed.contains(['.', '['])
}
