//! Remote service seam.
//!
//! Everything the client asks of the compiler backend or the engine goes
//! through [`EngineApi`]. [`HttpEngineClient`] is the production
//! implementation; tests substitute a mock or an in-memory fake.

use async_trait::async_trait;

use crate::graph::{IndicatorInfo, NormalizedStrategy};
use crate::utils::error::Result;

mod http;
pub mod types;

pub use http::HttpEngineClient;
pub use types::*;

/// Operations offered by the two remote services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Indicator catalog from the compiler backend.
    async fn indicators(&self) -> Result<Vec<IndicatorInfo>>;

    /// Generate source code for `platform`.
    async fn compile(&self, strategy: &NormalizedStrategy, platform: &str) -> Result<String>;

    /// Start a backtest and return its job id.
    async fn submit_backtest(&self, request: &BacktestRequest) -> Result<String>;

    async fn backtest_progress(&self, job_id: &str) -> Result<BacktestProgress>;

    async fn status(&self) -> Result<ServiceStatus>;

    async fn logs(&self, source: &str, lines: usize) -> Result<Vec<LogLine>>;

    async fn log_runs(&self) -> Result<Vec<RunInfo>>;

    async fn gateway_start(&self) -> Result<ControlResponse>;

    async fn gateway_stop(&self) -> Result<ControlResponse>;

    async fn gateway_login(&self) -> Result<ControlResponse>;

    async fn gateway_job(&self, job_id: &str) -> Result<GatewayJobStatus>;

    async fn pipeline_start(&self, request: &PipelineStartRequest) -> Result<ControlResponse>;

    async fn pipeline_stop(&self) -> Result<ControlResponse>;

    async fn list_configs(&self) -> Result<Vec<ConfigSummary>>;

    async fn get_config(&self, name: &str) -> Result<ConfigDetail>;

    async fn update_config(&self, name: &str, yaml: &str) -> Result<()>;

    async fn create_config(&self, config: &NewConfig) -> Result<()>;

    async fn delete_config(&self, name: &str) -> Result<()>;

    async fn graph_to_yaml(&self, request: &GraphToYamlRequest) -> Result<String>;
}
