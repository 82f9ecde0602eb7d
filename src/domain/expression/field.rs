//! Typed field definitions carrying a value-derivation expression

use std::fmt;

use serde::{Deserialize, Serialize};

/// Target type of a field value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Integer,
    Object,
    Array,
    Map,
}

impl FieldType {
    /// Structural types are flattened rather than coerced
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Object | Self::Array | Self::Map)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Object => "Object",
            Self::Array => "Array",
            Self::Map => "Map",
        };
        write!(f, "{}", name)
    }
}

/// How a field's value is derived
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    /// Literal value (or nested children)
    #[default]
    Fixed,
    /// Reference into the variable mapping / workflow context
    Variable,
    /// JSONPath selector over the current document
    JsonPath,
    /// Template with `{name}` placeholders
    StringInterpolation,
    /// Regex applied to the stringified document
    Regex,
    /// Whole document passed through
    Dynamic,
}

/// Expression attached to a field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FieldExpression {
    #[serde(rename = "type", default)]
    pub expression_type: ExpressionType,

    #[serde(default)]
    pub value: String,
}

impl FieldExpression {
    pub fn new(expression_type: ExpressionType, value: impl Into<String>) -> Self {
        Self {
            expression_type,
            value: value.into(),
        }
    }
}

/// A named, typed field with an expression and optional children
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub expression: FieldExpression,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            expression: FieldExpression::default(),
            children: Vec::new(),
        }
    }

    pub fn fixed(name: impl Into<String>, field_type: FieldType, value: impl Into<String>) -> Self {
        Self::new(name, field_type).with_expression(ExpressionType::Fixed, value)
    }

    pub fn variable(name: impl Into<String>, field_type: FieldType, reference: impl Into<String>) -> Self {
        Self::new(name, field_type).with_expression(ExpressionType::Variable, reference)
    }

    pub fn interpolated(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, FieldType::String).with_expression(ExpressionType::StringInterpolation, template)
    }

    pub fn json_path(name: impl Into<String>, field_type: FieldType, path: impl Into<String>) -> Self {
        Self::new(name, field_type).with_expression(ExpressionType::JsonPath, path)
    }

    pub fn with_expression(mut self, expression_type: ExpressionType, value: impl Into<String>) -> Self {
        self.expression = FieldExpression::new(expression_type, value);
        self
    }

    pub fn with_child(mut self, child: FieldDefinition) -> Self {
        self.children.push(child);
        self
    }
}
