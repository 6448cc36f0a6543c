//! Code generation through the compiler backend.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::EngineApi;
use crate::graph::{fallback_catalog, normalize, IndicatorInfo, StrategyGraph};
use crate::utils::error::Error;

/// Target platforms the compiler backend can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    PineScript,
    CSharp,
    Mql,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::PineScript, Platform::CSharp, Platform::Mql];

    pub fn as_str(&self) -> &'static str {
        match self {
            | Platform::PineScript => "pinescript",
            | Platform::CSharp => "csharp",
            | Platform::Mql => "mql",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            | "pinescript" | "pine" => Ok(Platform::PineScript),
            | "csharp" | "c#" => Ok(Platform::CSharp),
            | "mql" => Ok(Platform::Mql),
            | other => Err(Error::Validation(format!("Unsupported platform: {other}"))),
        }
    }
}

/// Text returned in place of code when compilation fails.
pub fn error_placeholder(message: &str, compiler_url: &str) -> String {
    format!("// Compilation Error:\n// {message}\n\n// Make sure the backend is running at {compiler_url}")
}

pub struct Compiler {
    api: Arc<dyn EngineApi>,
    compiler_url: String,
}

impl Compiler {
    pub fn new(api: Arc<dyn EngineApi>, compiler_url: impl Into<String>) -> Self {
        Self { api, compiler_url: compiler_url.into() }
    }

    /// Compile the graph for `platform`. Never fails: errors come back as a
    /// commented placeholder.
    #[instrument(skip(self, graph), fields(nodes = graph.nodes.len()))]
    pub async fn compile(&self, graph: &StrategyGraph, platform: Platform) -> String {
        let strategy = normalize(&graph.nodes, &graph.edges, graph.display_name(), Some(platform.as_str()));
        match self.api.compile(&strategy, platform.as_str()).await {
            | Ok(code) => {
                info!(%platform, bytes = code.len(), "Compiled strategy");
                code
            }
            | Err(e) => {
                warn!(%platform, error = %e, "Compilation failed");
                error_placeholder(&e.display_message(), &self.compiler_url)
            }
        }
    }
}

/// Indicator catalog, or the built-in one when the backend is unreachable.
pub async fn load_catalog(api: &dyn EngineApi) -> Vec<IndicatorInfo> {
    match api.indicators().await {
        | Ok(list) => list,
        | Err(e) => {
            warn!(error = %e, "Failed to load indicators; using built-in catalog");
            fallback_catalog()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockEngineApi;
    use crate::graph::Side;
    use mockall::predicate::{always, eq, function};

    #[test]
    fn platform_names() {
        assert_eq!("pinescript".parse::<Platform>().unwrap(), Platform::PineScript);
        assert_eq!("CSharp".parse::<Platform>().unwrap(), Platform::CSharp);
        assert_eq!(Platform::Mql.to_string(), "mql");
        assert!("cobol".parse::<Platform>().is_err());
    }

    #[test]
    fn placeholder_layout() {
        assert_eq!(
            error_placeholder("boom", "http://localhost:8010"),
            "// Compilation Error:\n// boom\n\n// Make sure the backend is running at http://localhost:8010"
        );
    }

    #[tokio::test]
    async fn compile_sends_target_platform() {
        let mut api = MockEngineApi::new();
        api.expect_compile()
            .with(function(|s: &crate::graph::NormalizedStrategy| s.target_platform.as_deref() == Some("mql")), eq("mql"))
            .returning(|_, _| Ok("//+------------------+".to_string()));

        let mut graph = StrategyGraph::new();
        graph.add_action(Side::Buy);
        let code = Compiler::new(Arc::new(api), "http://c").compile(&graph, Platform::Mql).await;
        assert_eq!(code, "//+------------------+");
    }

    #[tokio::test]
    async fn compile_failure_yields_placeholder() {
        let mut api = MockEngineApi::new();
        api.expect_compile()
            .with(always(), always())
            .returning(|_, _| Err(Error::Remote { status: 422, detail: Some("no action node".into()) }));

        let code = Compiler::new(Arc::new(api), "http://c:8010").compile(&StrategyGraph::new(), Platform::PineScript).await;
        assert!(code.starts_with("// Compilation Error:\n// no action node"));
        assert!(code.ends_with("running at http://c:8010"));
    }

    #[tokio::test]
    async fn catalog_falls_back() {
        let mut api = MockEngineApi::new();
        api.expect_indicators().returning(|| Err(Error::Remote { status: 503, detail: None }));
        let catalog = load_catalog(&api).await;
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog[0].id, "rsi");
    }
}
