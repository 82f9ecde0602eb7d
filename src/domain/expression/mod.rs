//! Expression layer: flat variable mapping, field expressions, conditions

pub mod coercion;
pub mod evaluator;
pub mod field;
pub mod flatten;
pub mod json_path;
pub mod path;
pub mod rule;

pub use coercion::{convert_type, is_truthy, stringify};
pub use evaluator::{parse_field_value, ExpressionEvaluator, VariableLookup};
pub use field::{ExpressionType, FieldDefinition, FieldExpression, FieldType};
pub use flatten::{flatten, flatten_into, unflatten, unflatten_object, FlatMap};
pub use path::{parse_path, PathSegment};
pub use rule::{evaluate_condition, ConditionOperator, Rule};
