//! In-memory editing session for a strategy graph.
//!
//! Every parameter change goes through [`StrategyGraph::apply`]; nodes never
//! carry a handle back into the session.

use serde_json::Value;
use tracing::debug;

use super::catalog::IndicatorInfo;
use super::sanitize::{sanitize, Rejected};
use super::{GraphEdge, GraphNode, NodeKind, Position, Side, ACTION_TYPE_KEY};

/// Id of the synthetic start node.
pub const START_NODE_ID: &str = "start";
/// Name used when the session has none.
pub const DEFAULT_STRATEGY_NAME: &str = "My Strategy";

/// Keys whose edits are also written into the node's top-level data.
const MIRRORED_FIELDS: [&str; 4] = ["operator", "value", "stopLoss", "takeProfit"];

/// A single parameter change addressed to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEdit {
    pub node_id: String,
    pub field: String,
    pub value: String,
}

impl NodeEdit {
    pub fn new(node_id: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), field: field.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Written; holds the value as stored after sanitizing
    Applied(String),
    Rejected(Rejected),
    UnknownNode,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyGraph {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    next_seq: u64,
}

impl Default for StrategyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyGraph {
    /// New session holding only the start node.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_STRATEGY_NAME.to_string(),
            nodes: vec![start_node()],
            edges: Vec::new(),
            next_seq: 0,
        }
    }

    /// Session over an existing node and edge set (used by document import).
    pub fn from_parts(name: impl Into<String>, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self { name: name.into(), nodes, edges, next_seq: 0 }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Strategy name, falling back to [`DEFAULT_STRATEGY_NAME`] when blank.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            DEFAULT_STRATEGY_NAME
        } else {
            &self.name
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        loop {
            self.next_seq += 1;
            let id = format!("{prefix}-{}", self.next_seq);
            if self.node(&id).is_none() {
                return id;
            }
        }
    }

    fn push(&mut self, node: GraphNode) -> &GraphNode {
        debug!(node_id = %node.id, kind = node.kind.canonical_type(), "Node added");
        self.nodes.push(node);
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn add_indicator(&mut self, indicator: &IndicatorInfo) -> &GraphNode {
        let id = self.next_id(&indicator.id);
        let offset = 100.0 + 40.0 * (self.nodes.len() % 10) as f64;
        let mut node = GraphNode::new(id, NodeKind::Indicator)
            .with_label(indicator.name.clone())
            .with_data("id", indicator.id.clone())
            .with_data("name", indicator.name.clone())
            .with_data("category", indicator.category.clone())
            .with_position(offset, offset);
        node.parameters = indicator.starting_params();
        self.push(node)
    }

    pub fn add_logic(&mut self) -> &GraphNode {
        let id = self.next_id("logic");
        let node = GraphNode::new(id, NodeKind::Logic)
            .with_param("operator", "crossunder")
            .with_param("value", "")
            .with_position(400.0, 300.0);
        self.push(node)
    }

    pub fn add_action(&mut self, side: Side) -> &GraphNode {
        let id = self.next_id("action");
        let node = GraphNode::new(id, NodeKind::Action)
            .with_data(ACTION_TYPE_KEY, side.as_str())
            .with_param(ACTION_TYPE_KEY, side.as_str())
            .with_param("stopLoss", "")
            .with_param("takeProfit", "")
            .with_position(600.0, 300.0);
        self.push(node)
    }

    pub fn connect(&mut self, edge: GraphEdge) {
        debug!(source = %edge.source, target = %edge.target, "Edge added");
        self.edges.push(edge);
    }

    /// Remove a node. Edges touching it are left in place.
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let idx = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(idx))
    }

    pub fn remove_edge(&mut self, index: usize) -> Option<GraphEdge> {
        (index < self.edges.len()).then(|| self.edges.remove(index))
    }

    /// Lay nodes out left to right on a three-row stagger.
    pub fn auto_layout(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.position = Position::new(100.0 + 200.0 * i as f64, 150.0 + 150.0 * (i % 3) as f64);
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_strategy_nodes(&self) -> bool {
        self.nodes.iter().any(|n| n.kind.is_strategy_node())
    }

    /// Apply a parameter edit.
    pub fn apply(&mut self, edit: NodeEdit) -> EditOutcome {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == edit.node_id) else {
            return EditOutcome::UnknownNode;
        };

        let value = match sanitize(&edit.field, &edit.value) {
            Ok(v) => v,
            Err(rejected) => {
                debug!(node_id = %edit.node_id, field = %edit.field, "Edit rejected");
                return EditOutcome::Rejected(rejected);
            }
        };

        node.parameters.insert(edit.field.clone(), Value::String(value.clone()));
        if MIRRORED_FIELDS.contains(&edit.field.as_str()) {
            node.data.insert(edit.field, Value::String(value.clone()));
        }
        EditOutcome::Applied(value)
    }
}

fn start_node() -> GraphNode {
    GraphNode::new(START_NODE_ID, NodeKind::Start).with_label("Strategy Start").with_position(250.0, 50.0)
}
