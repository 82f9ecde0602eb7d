//! Workflow definition: a directed graph of typed nodes

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::WorkflowError;
use super::node_types::{NodeKind, NodeType};
use super::variable::{INPUT_PREFIX, SYS_PREFIX};

const PATH_SYNTAX: [char; 4] = ['.', '[', ']', '\''];

/// A node within a workflow (wrapper around node kind with graph metadata)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDefinition {
    /// Unique key within the workflow
    key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,

    #[serde(flatten)]
    kind: NodeKind,

    /// Static successor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

impl NodeDefinition {
    pub fn new(key: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            kind,
            next: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}

/// A workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    id: String,

    #[serde(default)]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    nodes: Vec<NodeDefinition>,

    /// Workflow-level constants handed to script sandboxes
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    globals: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            globals: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.globals.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.nodes
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    /// Look up a node by key
    pub fn node(&self, key: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// The single Start node
    pub fn start_node(&self) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.node_type() == NodeType::Start)
    }

    /// Keys of nodes reserved as For loop bodies
    pub fn loop_body_keys(&self) -> HashSet<&str> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::For(for_node) => Some(for_node.body.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Check graph well-formedness before execution
    ///
    /// Node keys are the first segment of every variable reference, so
    /// they may not contain path syntax.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::definition_invalid(format!(
                "workflow '{}' has no nodes",
                self.id
            )));
        }

        let mut keys = HashSet::new();
        for node in &self.nodes {
            if node.key.trim().is_empty() {
                return Err(WorkflowError::definition_invalid("node key cannot be empty"));
            }
            if node.key == SYS_PREFIX || node.key == INPUT_PREFIX {
                return Err(WorkflowError::definition_invalid(format!(
                    "node key '{}' is reserved",
                    node.key
                )));
            }
            if node.key.contains(&PATH_SYNTAX[..]) {
                return Err(WorkflowError::definition_invalid(format!(
                    "node key '{}' cannot contain '.', '[', ']' or quotes",
                    node.key
                )));
            }
            if !keys.insert(node.key.as_str()) {
                return Err(WorkflowError::definition_invalid(format!(
                    "duplicate node key '{}'",
                    node.key
                )));
            }
        }

        let starts = self
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Start)
            .count();
        if starts != 1 {
            return Err(WorkflowError::definition_invalid(format!(
                "workflow must have exactly one start node, found {}",
                starts
            )));
        }

        let bodies = self.loop_body_keys();
        for node in &self.nodes {
            if let NodeKind::For(for_node) = &node.kind {
                match self.node(&for_node.body) {
                    None => {
                        return Err(WorkflowError::definition_invalid(format!(
                            "loop '{}' references unknown body node '{}'",
                            node.key, for_node.body
                        )));
                    }
                    Some(body) if matches!(body.node_type(), NodeType::Start | NodeType::For) => {
                        return Err(WorkflowError::definition_invalid(format!(
                            "loop '{}' cannot use {} node '{}' as its body",
                            node.key,
                            body.node_type(),
                            body.key
                        )));
                    }
                    Some(_) => {}
                }
            }

            let mut successors = node.kind.branch_targets();
            successors.extend(node.next());

            for target in &successors {
                if !keys.contains(target) {
                    return Err(WorkflowError::definition_invalid(format!(
                        "node '{}' points to unknown node '{}'",
                        node.key, target
                    )));
                }
                if bodies.contains(target) {
                    return Err(WorkflowError::definition_invalid(format!(
                        "node '{}' cannot route to loop body '{}'",
                        node.key, target
                    )));
                }
                if self.node(target).is_some_and(|n| n.node_type() == NodeType::Start) {
                    return Err(WorkflowError::definition_invalid(format!(
                        "node '{}' cannot route back to the start node",
                        node.key
                    )));
                }
            }

            let routes_itself = matches!(node.node_type(), NodeType::Condition)
                || (node.node_type() == NodeType::QuestionClassification
                    && self.classification_fully_routed(node));
            let terminal = node.node_type() == NodeType::End || bodies.contains(node.key.as_str());
            if !terminal && !routes_itself && node.next.is_none() {
                return Err(WorkflowError::definition_invalid(format!(
                    "node '{}' has no successor",
                    node.key
                )));
            }
        }

        Ok(())
    }

    fn classification_fully_routed(&self, node: &NodeDefinition) -> bool {
        match &node.kind {
            NodeKind::QuestionClassification(c) => {
                !c.classes.is_empty() && c.classes.iter().all(|class| class.next.is_some())
            }
            _ => false,
        }
    }
}
