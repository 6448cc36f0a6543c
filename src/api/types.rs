//! Request and response bodies exchanged with the compiler backend and the engine.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::graph::{NormalizedConnection, NormalizedNode, NormalizedStrategy};

/// Accept either a JSON string or a number and keep it as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub strategy: NormalizedStrategy,
    pub symbols: Vec<String>,
    pub years: u32,
    pub starting_cash: f64,
    pub slippage_bps: f64,
    pub fee_bps: f64,
    pub interval: String,
}

/// One progress snapshot of a running backtest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub result: Option<BacktestResult>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    #[serde(default)]
    pub total_return: Option<f64>,
    #[serde(default)]
    pub max_drawdown: Option<f64>,
    #[serde(default)]
    pub sharpe_approx: Option<f64>,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub starting_equity: Option<f64>,
    #[serde(default)]
    pub ending_equity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquityPoint {
    #[serde(default, deserialize_with = "string_or_number")]
    pub ts: Option<String>,
    #[serde(default)]
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default, deserialize_with = "string_or_number")]
    pub ts: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub qty: Option<f64>,
    /// Sent as a number or a numeric string
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: Option<String>,
}

impl Trade {
    pub fn price_value(&self) -> f64 {
        self.price.as_deref().and_then(|p| p.parse().ok()).unwrap_or(0.0)
    }

    /// Date part of the timestamp.
    pub fn date(&self) -> &str {
        self.ts.as_deref().and_then(|t| t.split(' ').next()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default)]
    pub metrics: BacktestMetrics,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
    #[serde(default)]
    pub trades: Vec<Trade>,
    #[serde(default)]
    pub total_trades: Option<u64>,
    #[serde(default)]
    pub used_default_strategy: Option<bool>,
}

/// Response to any process control POST.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayJobStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub gateway_running: bool,
    #[serde(default)]
    pub gateway_pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStartRequest {
    pub config: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineInfo {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub uptime: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub run_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionStats {
    #[serde(default, rename = "total_decisions", alias = "total_count")]
    pub total_count: u64,
    #[serde(default, rename = "action_signals", alias = "action_signal_count")]
    pub action_signal_count: u64,
    #[serde(default)]
    pub last_timestamp: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

/// Engine-side view of the gateway, auth state, pipeline and decision log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub gateway: ProcessInfo,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub auth_updated: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineInfo,
    #[serde(default)]
    pub decisions: DecisionStats,
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl From<String> for LogLevel {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            | "error" => LogLevel::Error,
            | "warning" | "warn" => LogLevel::Warning,
            | "debug" => LogLevel::Debug,
            | _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogLine {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub lines: Vec<LogLine>,
}

/// A historical pipeline run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub name: String,
    #[serde(default)]
    pub has_log: bool,
    #[serde(default)]
    pub has_decisions: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(rename = "type", default)]
    pub config_type: String,
    #[serde(default)]
    pub symbols: Vec<Option<String>>,
}

impl ConfigSummary {
    /// Non-empty symbols only.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().flatten().map(String::as_str).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDetail {
    pub name: String,
    #[serde(rename = "type", default)]
    pub config_type: String,
    #[serde(default)]
    pub yaml: String,
    #[serde(default)]
    pub parsed: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigBody {
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConfig {
    pub name: String,
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    pub starting_cash: f64,
    pub slippage_bps: f64,
    pub dry_run: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self { starting_cash: 10_000.0, slippage_bps: 0.0, dry_run: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphToYamlRequest {
    pub nodes: Vec<NormalizedNode>,
    pub connections: Vec<NormalizedConnection>,
    pub name: String,
    pub symbols: Vec<String>,
    pub params: GenerateParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YamlResponse {
    pub yaml: String,
}

/// Error body shape used by both services.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub(crate) fn detail_text(self) -> Option<String> {
        match self.detail? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
