//! Strategy documents: the JSON export/import format of a graph.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::editor::StrategyGraph;
use super::{GraphEdge, GraphNode, NodeKind, ParamMap, Position, CALLBACK_KEY, LABEL_KEY, PARAMETERS_KEY};
use crate::utils::error::{Error, Result};

pub const DOCUMENT_VERSION: &str = "1.0";
pub const IMPORTED_NAME: &str = "Imported Strategy";

/// Node as written in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<DocumentNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

impl StrategyDocument {
    /// Snapshot a graph for export.
    pub fn from_graph(graph: &StrategyGraph) -> Self {
        Self {
            name: Some(graph.name.clone()),
            nodes: graph.nodes.iter().map(to_document_node).collect(),
            edges: graph.edges.clone(),
            version: Some(DOCUMENT_VERSION.to_string()),
            exported_at: Some(Utc::now()),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Import(format!("Invalid JSON: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Build an editing session from this document.
    pub fn into_graph(self) -> StrategyGraph {
        let name = self.name.filter(|n| !n.is_empty()).unwrap_or_else(|| IMPORTED_NAME.to_string());
        let nodes = self.nodes.into_iter().map(from_document_node).collect();
        StrategyGraph::from_parts(name, nodes, self.edges)
    }
}

fn to_document_node(node: &GraphNode) -> DocumentNode {
    let mut data: Map<String, Value> = node.data.clone().into_iter().collect();
    if let Some(label) = &node.label {
        data.insert(LABEL_KEY.to_string(), Value::String(label.clone()));
    }
    data.insert(
        PARAMETERS_KEY.to_string(),
        Value::Object(node.parameters.clone().into_iter().collect()),
    );
    DocumentNode {
        id: node.id.clone(),
        node_type: Some(node.kind.canvas_name().to_string()),
        data,
        position: node.position,
    }
}

/// Split canvas data into label, nested parameters and the remaining data.
fn from_document_node(doc: DocumentNode) -> GraphNode {
    let mut data = doc.data;
    data.remove(CALLBACK_KEY);
    let label = match data.remove(LABEL_KEY) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let parameters: ParamMap = match data.remove(PARAMETERS_KEY) {
        Some(Value::Object(map)) => map.into_iter().filter(|(k, _)| k != CALLBACK_KEY).collect(),
        _ => ParamMap::new(),
    };

    GraphNode {
        id: doc.id,
        kind: NodeKind::from_canvas(doc.node_type.as_deref()),
        label,
        data: data.into_iter().collect(),
        parameters,
        position: doc.position,
    }
}
