//! Graph → canonical strategy conversion.
//!
//! One function serves compilation, backtest submission and config
//! generation, so all three see identical node shapes.

use serde::{Deserialize, Serialize};

use super::{GraphEdge, GraphNode, NodeKind, ParamMap, Position, CALLBACK_KEY, LABEL_KEY, PARAMETERS_KEY};

/// Keys never admitted into a normalized parameter map.
const EXCLUDED_KEYS: [&str; 3] = [LABEL_KEY, CALLBACK_KEY, PARAMETERS_KEY];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub parameters: ParamMap,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedConnection {
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle")]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedStrategy {
    pub name: String,
    pub nodes: Vec<NormalizedNode>,
    pub connections: Vec<NormalizedConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_platform: Option<String>,
}

/// Normalize a graph. Total: every node and every edge produces output.
pub fn normalize(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    name: &str,
    target_platform: Option<&str>,
) -> NormalizedStrategy {
    NormalizedStrategy {
        name: name.to_string(),
        nodes: nodes.iter().map(normalize_node).collect(),
        connections: edges.iter().map(normalize_edge).collect(),
        target_platform: target_platform.map(str::to_string),
    }
}

pub fn normalize_node(node: &GraphNode) -> NormalizedNode {
    NormalizedNode {
        id: node.id.clone(),
        node_type: node.kind.canonical_type().to_string(),
        name: node_name(node),
        parameters: merged_parameters(node),
        position: node.position,
    }
}

fn normalize_edge(edge: &GraphEdge) -> NormalizedConnection {
    NormalizedConnection {
        source: edge.source.clone(),
        target: edge.target.clone(),
        source_handle: edge.source_handle.clone(),
        target_handle: edge.target_handle.clone(),
    }
}

/// Explicit label, else a name derived from the node kind.
fn node_name(node: &GraphNode) -> String {
    if let Some(label) = node.label.as_deref().filter(|l| !l.is_empty()) {
        return label.to_string();
    }
    match node.kind {
        | NodeKind::Logic => "Logic".to_string(),
        | NodeKind::Action => format!("Action {}", node.side().unwrap_or_default()),
        | _ => "Node".to_string(),
    }
}

/// Top-level data overlaid with the nested parameters; nested keys win.
fn merged_parameters(node: &GraphNode) -> ParamMap {
    node.data
        .iter()
        .chain(node.parameters.iter())
        .filter(|(k, _)| !EXCLUDED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
