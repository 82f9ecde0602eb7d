//! Node kinds and their per-type configuration

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::expression::FieldDefinition;

/// Node type discriminator, used as the runtime registry key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Condition,
    AiQuestion,
    QuestionClassification,
    Http,
    Plugin,
    Wiki,
    #[serde(rename = "javascript")]
    JavaScript,
    For,
}

impl NodeType {
    pub const ALL: [NodeType; 10] = [
        Self::Start,
        Self::End,
        Self::Condition,
        Self::AiQuestion,
        Self::QuestionClassification,
        Self::Http,
        Self::Plugin,
        Self::Wiki,
        Self::JavaScript,
        Self::For,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Condition => "condition",
            Self::AiQuestion => "ai_question",
            Self::QuestionClassification => "question_classification",
            Self::Http => "http",
            Self::Plugin => "plugin",
            Self::Wiki => "wiki",
            Self::JavaScript => "javascript",
            Self::For => "for",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node configuration, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Start(StartNode),
    End(EndNode),
    Condition(ConditionNode),
    AiQuestion(AiQuestionNode),
    QuestionClassification(QuestionClassificationNode),
    Http(HttpNode),
    Plugin(PluginNode),
    Wiki(WikiNode),
    #[serde(rename = "javascript")]
    JavaScript(JavaScriptNode),
    For(ForNode),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Start(_) => NodeType::Start,
            Self::End(_) => NodeType::End,
            Self::Condition(_) => NodeType::Condition,
            Self::AiQuestion(_) => NodeType::AiQuestion,
            Self::QuestionClassification(_) => NodeType::QuestionClassification,
            Self::Http(_) => NodeType::Http,
            Self::Plugin(_) => NodeType::Plugin,
            Self::Wiki(_) => NodeType::Wiki,
            Self::JavaScript(_) => NodeType::JavaScript,
            Self::For(_) => NodeType::For,
        }
    }

    /// Successor keys chosen by the node itself rather than its static `next`
    pub fn branch_targets(&self) -> Vec<&str> {
        match self {
            Self::Condition(condition) => {
                let mut targets = vec![condition.if_branch.next.as_str()];
                targets.extend(condition.else_ifs.iter().map(|b| b.next.as_str()));
                targets.push(condition.else_next.as_str());
                targets
            }
            Self::QuestionClassification(classification) => classification
                .classes
                .iter()
                .filter_map(|class| class.next.as_deref())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// How the Start node builds its output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartOutputMode {
    /// Declared fields from startup parameters, falling back to fixed defaults
    #[default]
    Fixed,
    /// Declared fields evaluated as expressions over the instance
    Dynamic,
    /// Output produced by the script sandbox
    Script,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StartNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    #[serde(default)]
    pub output_mode: StartOutputMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl StartNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output_mode(mut self, mode: StartOutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EndNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl EndNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldDefinition) -> Self {
        self.outputs.push(field);
        self
    }
}

/// Condition expression and the node it routes to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionBranch {
    pub expression: String,
    pub next: String,
}

impl ConditionBranch {
    pub fn new(expression: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            next: next.into(),
        }
    }
}

/// If / else-if / else routing; the first true branch wins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionNode {
    #[serde(rename = "if")]
    pub if_branch: ConditionBranch,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_ifs: Vec<ConditionBranch>,

    #[serde(rename = "else")]
    pub else_next: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl ConditionNode {
    pub fn new(if_branch: ConditionBranch, else_next: impl Into<String>) -> Self {
        Self {
            if_branch,
            else_ifs: Vec::new(),
            else_next: else_next.into(),
            outputs: Vec::new(),
        }
    }

    pub fn with_else_if(mut self, branch: ConditionBranch) -> Self {
        self.else_ifs.push(branch);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiQuestionNode {
    pub model_id: String,

    /// System prompt template with `{name}` placeholders
    #[serde(default)]
    pub prompt: String,

    pub question: FieldDefinition,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AiQuestionNode {
    pub fn new(model_id: impl Into<String>, question: FieldDefinition) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: String::new(),
            question,
            stream: false,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Class a question can be sorted into; `next` overrides the node's successor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationClass {
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl ClassificationClass {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
            next: None,
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionClassificationNode {
    pub model_id: String,

    #[serde(default)]
    pub prompt: String,

    pub question: FieldDefinition,

    pub classes: Vec<ClassificationClass>,
}

impl QuestionClassificationNode {
    pub fn new(model_id: impl Into<String>, question: FieldDefinition) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: String::new(),
            question,
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: ClassificationClass) -> Self {
        self.classes.push(class);
        self
    }
}

/// HTTP request method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::PATCH => "PATCH",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpNode {
    #[serde(default)]
    pub method: HttpMethod,

    /// URL template with `{name}` placeholders
    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<FieldDefinition>,

    /// Request body fields; no fields means no body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,

    /// Extra attempts after a failed call
    #[serde(default)]
    pub retries: u32,

    /// Pause before each retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_retry_delay_ms() -> u64 {
    200
}

impl HttpNode {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: None,
        }
    }

    pub fn with_header(mut self, field: FieldDefinition) -> Self {
        self.headers.push(field);
        self
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldDefinition) -> Self {
        self.outputs.push(field);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginNode {
    pub plugin_id: String,
    pub action: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl PluginNode {
    pub fn new(plugin_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            action: action.into(),
            inputs: Vec::new(),
            headers: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldDefinition) -> Self {
        self.outputs.push(field);
        self
    }
}

/// Knowledge-base search; the `question` input is the query text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WikiNode {
    pub wiki_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl WikiNode {
    pub fn new(wiki_id: impl Into<String>) -> Self {
        Self {
            wiki_id: wiki_id.into(),
            inputs: Vec::new(),
            top_k: None,
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JavaScriptNode {
    pub script: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldDefinition>,

    /// Use the script's return value as-is, ignoring `outputs`
    #[serde(default)]
    pub dynamic_output: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl JavaScriptNode {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            inputs: Vec::new(),
            dynamic_output: false,
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: FieldDefinition) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldDefinition) -> Self {
        self.outputs.push(field);
        self
    }

    pub fn with_dynamic_output(mut self) -> Self {
        self.dynamic_output = true;
        self
    }
}

/// Runs `body` once per element of `collection`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForNode {
    /// Variable reference resolving to an array
    pub collection: String,

    /// Key of the node executed per element
    pub body: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldDefinition>,
}

impl ForNode {
    pub fn new(collection: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            body: body.into(),
            outputs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::FieldType;
    use serde_json::json;

    #[test]
    fn test_node_type_names() {
        for node_type in NodeType::ALL {
            let json = serde_json::to_value(node_type).unwrap();
            assert_eq!(json, json!(node_type.as_str()));
        }
    }

    #[test]
    fn test_condition_node_deserialization() {
        let kind: NodeKind = serde_json::from_value(json!({
            "type": "condition",
            "if": {"expression": "input.age >= 18", "next": "nodeAdult"},
            "else_ifs": [{"expression": "input.age >= 13", "next": "nodeTeen"}],
            "else": "nodeMinor"
        }))
        .unwrap();

        assert_eq!(kind.node_type(), NodeType::Condition);
        assert_eq!(kind.branch_targets(), vec!["nodeAdult", "nodeTeen", "nodeMinor"]);
    }

    #[test]
    fn test_javascript_node_tag() {
        let kind = NodeKind::JavaScript(JavaScriptNode::new("return input;").with_dynamic_output());
        let json = serde_json::to_value(&kind).unwrap();

        assert_eq!(json["type"], "javascript");
        assert_eq!(json["dynamic_output"], true);
    }

    #[test]
    fn test_http_node_defaults() {
        let kind: NodeKind = serde_json::from_value(json!({
            "type": "http",
            "url": "https://api.example.com/users/{input.id}"
        }))
        .unwrap();

        let NodeKind::Http(http) = kind else {
            panic!("expected http node");
        };
        assert_eq!(http.method, HttpMethod::GET);
        assert_eq!(http.retries, 0);
        assert!(http.inputs.is_empty());
    }

    #[test]
    fn test_classification_targets() {
        let node = QuestionClassificationNode::new(
            "gpt-4",
            FieldDefinition::variable("q", FieldType::String, "input.q"),
        )
        .with_class(ClassificationClass::new("billing").with_next("nodeBilling"))
        .with_class(ClassificationClass::new("other"));

        let kind = NodeKind::QuestionClassification(node);
        assert_eq!(kind.branch_targets(), vec!["nodeBilling"]);
    }
}
