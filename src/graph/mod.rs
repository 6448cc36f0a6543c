//! Strategy graph model.
//!
//! The graph is what the user edits: a synthetic start node plus indicator,
//! logic and action nodes joined by edges. Nothing in here talks to the
//! network; [`normalize`] turns a graph into the canonical strategy that the
//! remote services accept.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod catalog;
pub mod document;
pub mod editor;
pub mod normalize;
pub mod sanitize;

pub use catalog::{fallback_catalog, IndicatorInfo};
pub use document::StrategyDocument;
pub use editor::{EditOutcome, NodeEdit, StrategyGraph};
pub use normalize::{normalize, NormalizedConnection, NormalizedNode, NormalizedStrategy};
pub use sanitize::{sanitize, Rejected, NUMERIC_FIELDS};

/// Free-form node data and parameter maps. Ordered so serialization is stable.
pub type ParamMap = BTreeMap<String, Value>;

/// Key under which the canvas used to stash its change callback.
pub const CALLBACK_KEY: &str = "onParameterChange";
/// Key holding the node's display label in canvas data.
pub const LABEL_KEY: &str = "label";
/// Key holding the nested parameter sub-mapping in canvas data.
pub const PARAMETERS_KEY: &str = "parameters";
/// Action nodes store their side under this key.
pub const ACTION_TYPE_KEY: &str = "actionType";

/// What a node is, as far as the strategy is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The synthetic strategy entry point
    Start,
    Indicator,
    Logic,
    Action,
    /// Any other spelling; carried through normalization untouched
    Other(String),
}

impl NodeKind {
    /// Parse the node type as spelled by the canvas or by a saved document.
    pub fn from_canvas(raw: Option<&str>) -> Self {
        match raw {
            | None | Some("") | Some("default") | Some("indicatorNode") | Some("indicator") => {
                NodeKind::Indicator
            }
            | Some("input") => NodeKind::Start,
            | Some("logicNode") | Some("logic") => NodeKind::Logic,
            | Some("actionNode") | Some("action") => NodeKind::Action,
            | Some(other) => NodeKind::Other(other.to_string()),
        }
    }

    /// Spelling used when a graph is exported back to the canvas format.
    pub fn canvas_name(&self) -> &str {
        match self {
            | NodeKind::Start => "input",
            | NodeKind::Indicator => "indicatorNode",
            | NodeKind::Logic => "logicNode",
            | NodeKind::Action => "actionNode",
            | NodeKind::Other(s) => s.as_str(),
        }
    }

    /// Canonical type name sent to the remote services.
    pub fn canonical_type(&self) -> &str {
        match self {
            | NodeKind::Start => "input",
            | NodeKind::Indicator => "indicator",
            | NodeKind::Logic => "logic",
            | NodeKind::Action => "action",
            | NodeKind::Other(s) => s.as_str(),
        }
    }

    pub fn is_strategy_node(&self) -> bool {
        matches!(self, NodeKind::Indicator | NodeKind::Logic | NodeKind::Action)
    }
}

/// Side of an action node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            | "buy" => Ok(Side::Buy),
            | "sell" => Ok(Side::Sell),
            | other => Err(format!("unknown action side '{other}' (expected buy or sell)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node as held by the editing session.
///
/// `data` never contains the label, the nested parameters or a callback; those
/// are split out on construction and import.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: Option<String>,
    pub data: ParamMap,
    pub parameters: ParamMap,
    pub position: Position,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            data: ParamMap::new(),
            parameters: ParamMap::new(),
            position: Position::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Side of an action node, read from its data.
    pub fn side(&self) -> Option<&str> {
        self.data
            .get(ACTION_TYPE_KEY)
            .or_else(|| self.parameters.get(ACTION_TYPE_KEY))
            .and_then(Value::as_str)
    }

    /// Look up a parameter, nested parameters first, then top-level data.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).or_else(|| self.data.get(key))
    }
}

/// Which input of a logic node an edge feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicInput {
    /// The monitored series
    A,
    /// Threshold or second series
    B,
}

impl LogicInput {
    pub fn from_handle(handle: &str) -> Option<Self> {
        match handle {
            "a" => Some(LogicInput::A),
            "b" => Some(LogicInput::B),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { source: source.into(), target: target.into(), source_handle: None, target_handle: None }
    }

    pub fn into_input(mut self, input: LogicInput) -> Self {
        self.target_handle = Some(match input {
            LogicInput::A => "a".to_string(),
            LogicInput::B => "b".to_string(),
        });
        self
    }

    /// Logic-node input this edge feeds, if its target handle names one.
    pub fn logic_input(&self) -> Option<LogicInput> {
        self.target_handle.as_deref().and_then(LogicInput::from_handle)
    }

    /// Short edge caption: "A", "B" or empty.
    pub fn label(&self) -> &'static str {
        match self.logic_input() {
            Some(LogicInput::A) => "A",
            Some(LogicInput::B) => "B",
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, NodeKind::Indicator)]
    #[case(Some("default"), NodeKind::Indicator)]
    #[case(Some("indicatorNode"), NodeKind::Indicator)]
    #[case(Some("input"), NodeKind::Start)]
    #[case(Some("logicNode"), NodeKind::Logic)]
    #[case(Some("actionNode"), NodeKind::Action)]
    #[case(Some("group"), NodeKind::Other("group".into()))]
    fn parses_canvas_kinds(#[case] raw: Option<&str>, #[case] expected: NodeKind) {
        assert_eq!(NodeKind::from_canvas(raw), expected);
    }

    #[test]
    fn canonical_types_cover_known_kinds() {
        assert_eq!(NodeKind::Start.canonical_type(), "input");
        assert_eq!(NodeKind::Indicator.canonical_type(), "indicator");
        assert_eq!(NodeKind::Logic.canonical_type(), "logic");
        assert_eq!(NodeKind::Action.canonical_type(), "action");
        assert_eq!(NodeKind::Other("x".into()).canonical_type(), "x");
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("BUY".parse::<Side>(), Ok(Side::Buy));
        assert_eq!(" sell ".parse::<Side>(), Ok(Side::Sell));
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn edge_label_follows_target_handle() {
        let e = GraphEdge::new("rsi-1", "logic-1").into_input(LogicInput::A);
        assert_eq!(e.label(), "A");
        assert_eq!(e.logic_input(), Some(LogicInput::A));
        assert_eq!(GraphEdge::new("a", "b").label(), "");
    }

    #[test]
    fn action_side_read_from_data_then_parameters() {
        let n = GraphNode::new("action-1", NodeKind::Action).with_param(ACTION_TYPE_KEY, "sell");
        assert_eq!(n.side(), Some("sell"));
        let n = n.with_data(ACTION_TYPE_KEY, "buy");
        assert_eq!(n.side(), Some("buy"));
    }
}
