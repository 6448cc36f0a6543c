//! Client configuration: service endpoints, poll cadence, request timeouts
//! and backtest form defaults.

mod template;

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::error::{Error, Result};

pub use template::{generate_commented_config_template, generate_config_template};

/// File looked up in the working directory first.
pub const LOCAL_CONFIG_FILE: &str = "alphastrat.toml";
pub const ENGINE_URL_ENV: &str = "ALPHASTRAT_ENGINE_URL";
pub const COMPILER_URL_ENV: &str = "ALPHASTRAT_COMPILER_URL";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Default log filter when `ALPHASTRAT_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub backtest: BacktestDefaults,
}

/// Base URLs of the two remote services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Indicator catalog and code generation
    pub compiler_url: String,
    /// Backtests, configs, process control, status and logs
    pub engine_url: String,
}

/// Poll loop cadence, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_backtest_poll_ms")]
    pub backtest_ms: u64,
    #[serde(default = "default_gateway_poll_ms")]
    pub gateway_job_ms: u64,
    #[serde(default = "default_status_poll_ms")]
    pub status_ms: u64,
    /// Wait after a control action before refreshing status and logs
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,
    /// Wait after a gateway script exits before re-checking liveness
    #[serde(default = "default_gateway_grace_ms")]
    pub gateway_grace_ms: u64,
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
}

/// Per-request timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Status, logs and job progress reads
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    #[serde(default = "default_submit_secs")]
    pub submit_secs: u64,
    #[serde(default = "default_gateway_start_secs")]
    pub gateway_start_secs: u64,
    /// Every other control action
    #[serde(default = "default_control_secs")]
    pub control_secs: u64,
    #[serde(default = "default_config_secs")]
    pub config_secs: u64,
    #[serde(default = "default_create_secs")]
    pub create_secs: u64,
    /// Compile and indicator catalog calls
    #[serde(default = "default_compile_secs")]
    pub compile_secs: u64,
}

/// Values pre-filled into the backtest form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestDefaults {
    #[serde(default = "default_symbols")]
    pub symbols: String,
    #[serde(default = "default_years")]
    pub years: u32,
    #[serde(default = "default_starting_cash")]
    pub starting_cash: f64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoints: EndpointsConfig::default(),
            polling: PollingConfig::default(),
            timeouts: TimeoutsConfig::default(),
            backtest: BacktestDefaults::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            compiler_url: "http://127.0.0.1:8010".to_string(),
            engine_url: "http://127.0.0.1:8020".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            backtest_ms: default_backtest_poll_ms(),
            gateway_job_ms: default_gateway_poll_ms(),
            status_ms: default_status_poll_ms(),
            refresh_delay_ms: default_refresh_delay_ms(),
            gateway_grace_ms: default_gateway_grace_ms(),
            log_lines: default_log_lines(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            read_secs: default_read_secs(),
            submit_secs: default_submit_secs(),
            gateway_start_secs: default_gateway_start_secs(),
            control_secs: default_control_secs(),
            config_secs: default_config_secs(),
            create_secs: default_create_secs(),
            compile_secs: default_compile_secs(),
        }
    }
}

impl Default for BacktestDefaults {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            years: default_years(),
            starting_cash: default_starting_cash(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

// --------- Helper default functions for serde ---------
fn default_log_level() -> String {
    "info".to_string()
}
fn default_backtest_poll_ms() -> u64 {
    1_000
}
fn default_gateway_poll_ms() -> u64 {
    3_000
}
fn default_status_poll_ms() -> u64 {
    5_000
}
fn default_refresh_delay_ms() -> u64 {
    1_000
}
fn default_gateway_grace_ms() -> u64 {
    2_000
}
fn default_log_lines() -> usize {
    200
}
fn default_read_secs() -> u64 {
    5
}
fn default_submit_secs() -> u64 {
    10
}
fn default_gateway_start_secs() -> u64 {
    15
}
fn default_control_secs() -> u64 {
    30
}
fn default_config_secs() -> u64 {
    5
}
fn default_create_secs() -> u64 {
    10
}
fn default_compile_secs() -> u64 {
    30
}
fn default_symbols() -> String {
    "AAPL".to_string()
}
fn default_years() -> u32 {
    2
}
fn default_starting_cash() -> f64 {
    10_000.0
}
fn default_slippage_bps() -> f64 {
    5.0
}

impl PollingConfig {
    pub fn backtest_interval(&self) -> Duration {
        Duration::from_millis(self.backtest_ms)
    }

    pub fn gateway_job_interval(&self) -> Duration {
        Duration::from_millis(self.gateway_job_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn gateway_grace(&self) -> Duration {
        Duration::from_millis(self.gateway_grace_ms)
    }
}

impl TimeoutsConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn submit(&self) -> Duration {
        Duration::from_secs(self.submit_secs)
    }

    pub fn gateway_start(&self) -> Duration {
        Duration::from_secs(self.gateway_start_secs)
    }

    pub fn control(&self) -> Duration {
        Duration::from_secs(self.control_secs)
    }

    pub fn config(&self) -> Duration {
        Duration::from_secs(self.config_secs)
    }

    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_secs)
    }
}

impl ClientConfig {
    /// Serialize default config to TOML string
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path.as_ref(), e))
        })?;
        let mut cfg: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        cfg.merge_env()?;
        Ok(cfg)
    }

    /// Save the configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file {:?}: {}", path, e)))?;
        Ok(())
    }

    /// Validate the configuration for required fields and reasonable values
    pub fn validate(&self) -> Result<()> {
        parse_base_url("compiler_url", &self.endpoints.compiler_url)?;
        parse_base_url("engine_url", &self.endpoints.engine_url)?;

        let p = &self.polling;
        if p.backtest_ms == 0 || p.gateway_job_ms == 0 || p.status_ms == 0 {
            return Err(Error::Config("Poll intervals must be > 0".to_string()));
        }
        if p.log_lines == 0 {
            return Err(Error::Config("polling.log_lines must be > 0".to_string()));
        }

        let t = &self.timeouts;
        let all = [
            t.read_secs,
            t.submit_secs,
            t.gateway_start_secs,
            t.control_secs,
            t.config_secs,
            t.create_secs,
            t.compile_secs,
        ];
        if all.contains(&0) {
            return Err(Error::Config("Request timeouts must be > 0".to_string()));
        }

        if self.backtest.years == 0 {
            return Err(Error::Config("backtest.years must be > 0".to_string()));
        }
        if self.backtest.starting_cash <= 0.0 {
            return Err(Error::Config("backtest.starting_cash must be > 0".to_string()));
        }
        Ok(())
    }

    /// Per-user config file location.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("alphastrat");
            path.push("config.toml");
            path
        })
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        if Path::new(LOCAL_CONFIG_FILE).exists() {
            return Self::from_file(LOCAL_CONFIG_FILE);
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        let mut config = Self::default();
        config.merge_env()?;
        Ok(config)
    }

    /// Merge environment variables into the configuration
    pub fn merge_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var(ENGINE_URL_ENV) {
            self.endpoints.engine_url = url;
        }

        if let Ok(url) = env::var(COMPILER_URL_ENV) {
            self.endpoints.compiler_url = url;
        }

        Ok(())
    }
}

/// Parse a service base URL, rejecting anything that is not http(s).
pub fn parse_base_url(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("Invalid {field} '{raw}': {e}")))?;
    match url.scheme() {
        | "http" | "https" => Ok(url),
        | other => Err(Error::Config(format!("{field} must use http or https, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoints.compiler_url, "http://127.0.0.1:8010");
        assert_eq!(config.endpoints.engine_url, "http://127.0.0.1:8020");
        assert_eq!(config.polling.backtest_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.gateway_job_interval(), Duration::from_secs(3));
        assert_eq!(config.polling.status_interval(), Duration::from_secs(5));
        assert_eq!(config.timeouts.submit(), Duration::from_secs(10));
        assert_eq!(config.polling.log_lines, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = ClientConfig::default();
        config.endpoints.engine_url = "http://engine.local:9000".to_string();
        config.polling.status_ms = 2_500;

        temp_env::with_vars(
            vec![(ENGINE_URL_ENV, None::<&str>), (COMPILER_URL_ENV, None::<&str>)],
            || {
                config.save(&config_path).unwrap();
                let loaded = ClientConfig::from_file(&config_path).unwrap();
                assert_eq!(loaded, config);
            },
        );
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\nstatus_ms = 750\n").unwrap();

        temp_env::with_vars(
            vec![(ENGINE_URL_ENV, None::<&str>), (COMPILER_URL_ENV, None::<&str>)],
            || {
                let cfg = ClientConfig::from_file(&path).unwrap();
                assert_eq!(cfg.polling.status_ms, 750);
                assert_eq!(cfg.polling.backtest_ms, 1_000);
                assert_eq!(cfg.endpoints, EndpointsConfig::default());
                assert_eq!(cfg.log_level, "info");
            },
        );
    }

    #[test]
    fn test_merge_env() {
        temp_env::with_vars(
            vec![
                (ENGINE_URL_ENV, Some("http://10.0.0.5:8020")),
                (COMPILER_URL_ENV, Some("http://10.0.0.5:8010")),
            ],
            || {
                let mut config = ClientConfig::default();
                config.merge_env().unwrap();

                assert_eq!(config.endpoints.engine_url, "http://10.0.0.5:8020");
                assert_eq!(config.endpoints.compiler_url, "http://10.0.0.5:8010");
            },
        );
    }

    #[test]
    fn validate_rejects_bad_urls_and_zero_intervals() {
        let mut config = ClientConfig::default();
        config.endpoints.engine_url = "not a url".into();
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = ClientConfig::default();
        config.endpoints.compiler_url = "ftp://127.0.0.1".into();
        assert_matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("http"));

        let mut config = ClientConfig::default();
        config.polling.status_ms = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }
}
