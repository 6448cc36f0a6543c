//! Pipeline config management on the engine.
//!
//! Configs are YAML documents stored by the engine under a name. They can be
//! listed, edited, created from a template and generated from a strategy graph.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::api::{ConfigDetail, ConfigSummary, EngineApi, GenerateParams, GraphToYamlRequest, NewConfig};
use crate::graph::{normalize, StrategyGraph};
use crate::orchestrator::backtest::parse_symbols;
use crate::utils::error::{Error, Result};

/// YAML a new config starts from when none is supplied.
pub const DEFAULT_TEMPLATE: &str = r#"# New AlphaStrat config

blocks: {}

pipeline:
  symbol: AAPL
  buy_expr: "False"
  sell_expr: "False"
  amount_expr: "10"
  dry_run: true
"#;

pub const GENERATED_NAME: &str = "generated_strategy";
pub const EMPTY_CANVAS: &str = "Build a strategy on the canvas first";

pub struct ConfigManager {
    api: Arc<dyn EngineApi>,
}

impl ConfigManager {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<ConfigSummary>> {
        self.api.list_configs().await
    }

    pub async fn load(&self, name: &str) -> Result<ConfigDetail> {
        self.api.get_config(name).await
    }

    /// Save `yaml` under `name`. The YAML must parse before it is sent.
    #[instrument(skip(self, yaml))]
    pub async fn save(&self, name: &str, yaml: &str) -> Result<()> {
        check_yaml(yaml)?;
        self.api.update_config(name, yaml).await?;
        info!(%name, "Config saved");
        Ok(())
    }

    /// Create a config, from [`DEFAULT_TEMPLATE`] when `yaml` is `None`, and
    /// return it as stored.
    #[instrument(skip(self, yaml))]
    pub async fn create(&self, name: &str, yaml: Option<&str>) -> Result<ConfigDetail> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Config name cannot be empty".to_string()));
        }
        let config = NewConfig { name: name.to_string(), yaml: yaml.unwrap_or(DEFAULT_TEMPLATE).to_string() };
        match self.api.create_config(&config).await {
            | Ok(()) => {}
            | Err(Error::Conflict(_)) => {
                return Err(Error::Conflict(format!("Config \"{name}\" already exists")));
            }
            | Err(Error::Remote { status: 400, detail }) => {
                let detail = detail.filter(|d| !d.trim().is_empty()).unwrap_or_else(|| "Invalid config data".to_string());
                return Err(Error::Remote { status: 400, detail: Some(detail) });
            }
            | Err(e) => return Err(e),
        }
        info!(%name, "Config created");
        self.load(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete_config(name).await?;
        info!(%name, "Config deleted");
        Ok(())
    }

    /// Ask the engine to turn the graph into a pipeline config.
    #[instrument(skip(self, graph, params), fields(nodes = graph.nodes.len()))]
    pub async fn generate_from_graph(
        &self,
        graph: &StrategyGraph,
        name: Option<&str>,
        symbols_text: &str,
        params: GenerateParams,
    ) -> Result<String> {
        if graph.nodes.len() <= 1 {
            return Err(Error::Validation(EMPTY_CANVAS.to_string()));
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(GENERATED_NAME);
        let strategy = normalize(&graph.nodes, &graph.edges, name, None);
        let request = GraphToYamlRequest {
            nodes: strategy.nodes,
            connections: strategy.connections,
            name: strategy.name,
            symbols: parse_symbols(symbols_text),
            params,
        };
        self.api.graph_to_yaml(&request).await
    }
}

fn check_yaml(yaml: &str) -> Result<()> {
    serde_yaml::from_str::<serde_yaml::Value>(yaml)
        .map(|_| ())
        .map_err(|e| Error::Validation(format!("Invalid YAML: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockEngineApi;
    use crate::graph::{GraphEdge, Side};
    use assert_matches::assert_matches;
    use mockall::predicate::function;
    use serde_json::json;

    fn detail(name: &str, yaml: &str) -> ConfigDetail {
        ConfigDetail { name: name.into(), config_type: "pipeline".into(), yaml: yaml.into(), parsed: json!({}) }
    }

    #[test]
    fn template_is_valid_yaml() {
        let parsed: serde_yaml::Value = serde_yaml::from_str(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(parsed["pipeline"]["symbol"].as_str(), Some("AAPL"));
        assert_eq!(parsed["pipeline"]["dry_run"].as_bool(), Some(true));
    }

    #[tokio::test]
    async fn save_rejects_broken_yaml_locally() {
        let mut api = MockEngineApi::new();
        api.expect_update_config().never();
        let err = ConfigManager::new(Arc::new(api)).save("live", "pipeline: [unclosed").await;
        assert_matches!(err, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn create_uses_template_and_loads_result() {
        let mut api = MockEngineApi::new();
        api.expect_create_config()
            .with(function(|c: &NewConfig| c.name == "momo" && c.yaml == DEFAULT_TEMPLATE))
            .returning(|_| Ok(()));
        api.expect_get_config().returning(|name| Ok(detail(name, DEFAULT_TEMPLATE)));

        let created = ConfigManager::new(Arc::new(api)).create("  momo ", None).await.unwrap();
        assert_eq!(created.name, "momo");
    }

    #[tokio::test]
    async fn create_maps_conflict_and_bad_request() {
        let mut api = MockEngineApi::new();
        api.expect_create_config()
            .with(function(|c: &NewConfig| c.name == "dup"))
            .returning(|_| Err(Error::Conflict("Resource already exists".into())));
        api.expect_create_config()
            .with(function(|c: &NewConfig| c.name == "bad"))
            .returning(|_| Err(Error::Remote { status: 400, detail: None }));
        let manager = ConfigManager::new(Arc::new(api));

        assert_matches!(manager.create("dup", None).await, Err(Error::Conflict(m)) if m == "Config \"dup\" already exists");
        assert_matches!(
            manager.create("bad", Some("x: 1")).await,
            Err(Error::Remote { status: 400, detail: Some(d) }) if d == "Invalid config data"
        );
        assert_matches!(manager.create("   ", None).await, Err(Error::Validation(m)) if m == "Config name cannot be empty");
    }

    #[tokio::test]
    async fn generate_requires_more_than_the_start_node() {
        let mut api = MockEngineApi::new();
        api.expect_graph_to_yaml().never();
        let err = ConfigManager::new(Arc::new(api))
            .generate_from_graph(&StrategyGraph::new(), None, "AAPL", GenerateParams::default())
            .await;
        assert_matches!(err, Err(Error::Validation(m)) if m == EMPTY_CANVAS);
    }

    #[tokio::test]
    async fn generate_sends_normalized_graph() {
        let mut api = MockEngineApi::new();
        api.expect_graph_to_yaml()
            .with(function(|r: &GraphToYamlRequest| {
                r.name == GENERATED_NAME
                    && r.symbols == ["AAPL", "MSFT"]
                    && r.nodes.len() == 2
                    && r.connections.len() == 1
                    && r.nodes.iter().all(|n| !n.parameters.contains_key("label"))
            }))
            .returning(|_| Ok("pipeline: {}\n".to_string()));

        let mut graph = StrategyGraph::new();
        let action = graph.add_action(Side::Sell).id.clone();
        graph.connect(GraphEdge::new("start", action));

        let yaml = ConfigManager::new(Arc::new(api))
            .generate_from_graph(&graph, Some(" "), "aapl, msft", GenerateParams::default())
            .await
            .unwrap();
        assert_eq!(yaml, "pipeline: {}\n");
    }
}
