//! reqwest-backed [`EngineApi`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::types::*;
use super::EngineApi;
use crate::config::{parse_base_url, ClientConfig, EndpointsConfig, TimeoutsConfig};
use crate::graph::{IndicatorInfo, NormalizedStrategy};
use crate::utils::error::{Error, Result};

/// JSON client for the compiler backend and the engine.
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    client: Client,
    compiler: Url,
    engine: Url,
    timeouts: TimeoutsConfig,
}

impl HttpEngineClient {
    pub fn new(endpoints: &EndpointsConfig, timeouts: TimeoutsConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            compiler: parse_base_url("compiler_url", &endpoints.compiler_url)?,
            engine: parse_base_url("engine_url", &endpoints.engine_url)?,
            timeouts,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.endpoints, config.timeouts.clone())
    }

    pub fn compiler_url(&self) -> &str {
        self.compiler.as_str().trim_end_matches('/')
    }

    pub fn engine_url(&self) -> &str {
        self.engine.as_str().trim_end_matches('/')
    }

    fn compiler_endpoint(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.compiler, segments)
    }

    fn engine_endpoint(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.engine, segments)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, timeout: Duration) -> Result<T> {
        let response = checked(request.timeout(timeout).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_unit(&self, request: RequestBuilder, timeout: Duration) -> Result<()> {
        checked(request.timeout(timeout).send().await?).await?;
        Ok(())
    }

    async fn control(&self, path: &str, timeout: Duration) -> Result<ControlResponse> {
        let url = self.engine_endpoint(&["api", "gateway", path])?;
        self.send_json(self.client.post(url).json(&serde_json::json!({})), timeout).await
    }
}

/// Append path segments to a base URL, percent-encoding each one.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("'{base}' cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map non-2xx responses to [`Error::Remote`] / [`Error::Conflict`].
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body).ok().and_then(ErrorBody::detail_text);
    debug!(status = status.as_u16(), ?detail, "Remote call failed");

    if status == StatusCode::CONFLICT {
        return Err(Error::Conflict(detail.unwrap_or_else(|| "Resource already exists".to_string())));
    }
    Err(Error::Remote { status: status.as_u16(), detail })
}

/// Pull `job_id` out of a submission body, accepting strings or numbers.
fn extract_job_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("job_id")? {
        | Value::String(s) if !s.is_empty() => Some(s.clone()),
        | Value::Number(n) => Some(n.to_string()),
        | _ => None,
    }
}

#[async_trait]
impl EngineApi for HttpEngineClient {
    #[instrument(skip(self))]
    async fn indicators(&self) -> Result<Vec<IndicatorInfo>> {
        let url = self.compiler_endpoint(&["api", "indicators"])?;
        self.send_json(self.client.get(url), self.timeouts.compile()).await
    }

    #[instrument(skip(self, strategy), fields(nodes = strategy.nodes.len()))]
    async fn compile(&self, strategy: &NormalizedStrategy, platform: &str) -> Result<String> {
        let mut url = self.compiler_endpoint(&["api", "compile", "temp"])?;
        url.query_pairs_mut().append_pair("target", platform);
        let resp: CompileResponse =
            self.send_json(self.client.post(url).json(strategy), self.timeouts.compile()).await?;
        Ok(resp.code)
    }

    #[instrument(skip(self, request), fields(symbols = ?request.symbols))]
    async fn submit_backtest(&self, request: &BacktestRequest) -> Result<String> {
        let url = self.engine_endpoint(&["api", "backtest"])?;
        let response = checked(
            self.client.post(url).json(request).timeout(self.timeouts.submit()).send().await?,
        )
        .await?;
        let body = response.text().await?;
        extract_job_id(&body).ok_or(Error::MissingJobId(body))
    }

    async fn backtest_progress(&self, job_id: &str) -> Result<BacktestProgress> {
        let url = self.engine_endpoint(&["api", "backtest", "progress", job_id])?;
        self.send_json(self.client.get(url), self.timeouts.read()).await
    }

    async fn status(&self) -> Result<ServiceStatus> {
        let url = self.engine_endpoint(&["api", "status"])?;
        self.send_json(self.client.get(url), self.timeouts.read()).await
    }

    async fn logs(&self, source: &str, lines: usize) -> Result<Vec<LogLine>> {
        let mut url = self.engine_endpoint(&["api", "logs"])?;
        url.query_pairs_mut().append_pair("lines", &lines.to_string()).append_pair("source", source);
        let resp: LogsResponse = self.send_json(self.client.get(url), self.timeouts.read()).await?;
        Ok(resp.lines)
    }

    async fn log_runs(&self) -> Result<Vec<RunInfo>> {
        let url = self.engine_endpoint(&["api", "logs", "runs"])?;
        self.send_json(self.client.get(url), self.timeouts.read()).await
    }

    #[instrument(skip(self))]
    async fn gateway_start(&self) -> Result<ControlResponse> {
        self.control("start", self.timeouts.gateway_start()).await
    }

    #[instrument(skip(self))]
    async fn gateway_stop(&self) -> Result<ControlResponse> {
        self.control("stop", self.timeouts.control()).await
    }

    #[instrument(skip(self))]
    async fn gateway_login(&self) -> Result<ControlResponse> {
        self.control("login", self.timeouts.control()).await
    }

    async fn gateway_job(&self, job_id: &str) -> Result<GatewayJobStatus> {
        let url = self.engine_endpoint(&["api", "gateway", "job", job_id])?;
        self.send_json(self.client.get(url), self.timeouts.read()).await
    }

    #[instrument(skip(self))]
    async fn pipeline_start(&self, request: &PipelineStartRequest) -> Result<ControlResponse> {
        let url = self.engine_endpoint(&["api", "pipeline", "start"])?;
        self.send_json(self.client.post(url).json(request), self.timeouts.control()).await
    }

    #[instrument(skip(self))]
    async fn pipeline_stop(&self) -> Result<ControlResponse> {
        let url = self.engine_endpoint(&["api", "pipeline", "stop"])?;
        self.send_json(self.client.post(url).json(&serde_json::json!({})), self.timeouts.control()).await
    }

    async fn list_configs(&self) -> Result<Vec<ConfigSummary>> {
        let url = self.engine_endpoint(&["api", "configs"])?;
        self.send_json(self.client.get(url), self.timeouts.config()).await
    }

    async fn get_config(&self, name: &str) -> Result<ConfigDetail> {
        let url = self.engine_endpoint(&["api", "configs", name])?;
        self.send_json(self.client.get(url), self.timeouts.config()).await
    }

    #[instrument(skip(self, yaml))]
    async fn update_config(&self, name: &str, yaml: &str) -> Result<()> {
        let url = self.engine_endpoint(&["api", "configs", name])?;
        let body = ConfigBody { yaml: yaml.to_string() };
        self.send_unit(self.client.put(url).json(&body), self.timeouts.config()).await
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    async fn create_config(&self, config: &NewConfig) -> Result<()> {
        let url = self.engine_endpoint(&["api", "configs", "new"])?;
        self.send_unit(self.client.post(url).json(config), self.timeouts.create()).await
    }

    #[instrument(skip(self))]
    async fn delete_config(&self, name: &str) -> Result<()> {
        let url = self.engine_endpoint(&["api", "configs", name])?;
        self.send_unit(self.client.delete(url), self.timeouts.config()).await
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn graph_to_yaml(&self, request: &GraphToYamlRequest) -> Result<String> {
        let url = self.engine_endpoint(&["api", "graph-to-yaml"])?;
        let resp: YamlResponse =
            self.send_json(self.client.post(url).json(request), self.timeouts.create()).await?;
        Ok(resp.yaml)
    }
}
