//! Configuration template generation

use crate::config::ClientConfig;
use crate::utils::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Generate a default configuration file at the specified path
pub fn generate_config_template<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = ClientConfig::default();
    config.save(path).map_err(|e| Error::Config(e.to_string()))
}

/// Generate a configuration file with comments explaining each field
pub fn generate_commented_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let toml_str = r#"# AlphaStrat client configuration
# Every key is optional; missing keys fall back to the values shown here.
# ALPHASTRAT_ENGINE_URL and ALPHASTRAT_COMPILER_URL override the endpoints,
# ALPHASTRAT_LOG overrides log_level.

# Log filter (tracing EnvFilter syntax, e.g. "info" or "alphastrat=debug")
log_level = "info"

[endpoints]
# Compiler backend: indicator catalog and code generation
compiler_url = "http://127.0.0.1:8010"

# Engine: backtests, pipeline configs, gateway/pipeline control, status, logs
engine_url = "http://127.0.0.1:8020"

[polling]
# Backtest progress poll interval (ms)
backtest_ms = 1000

# Gateway launch job poll interval (ms)
gateway_job_ms = 3000

# Service status and log tail poll interval (ms)
status_ms = 5000

# Delay after a control action before status and logs are refreshed (ms)
refresh_delay_ms = 1000

# Delay after the gateway script exits before liveness is re-checked (ms)
gateway_grace_ms = 2000

# Lines requested per log fetch
log_lines = 200

[timeouts]
# Status, logs and job progress reads (s)
read_secs = 5

# Backtest submission (s)
submit_secs = 10

# Gateway start (s)
gateway_start_secs = 15

# Other control actions (s)
control_secs = 30

# Config list/load/save/delete (s)
config_secs = 5

# Config create (s)
create_secs = 10

# Compile and indicator catalog (s)
compile_secs = 30

[backtest]
# Defaults for the backtest form
symbols = "AAPL"
years = 2
starting_cash = 10000.0
slippage_bps = 5.0
"#;

    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_config_template() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("alphastrat.toml");

        generate_commented_config_template(&config_path).unwrap();
        assert!(config_path.exists());

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("AlphaStrat client configuration"));
        assert!(content.contains("engine_url"));
    }

    #[test]
    fn commented_template_parses_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config").join("config.toml");

        generate_commented_config_template(&config_path).unwrap();
        let content = fs::read_to_string(&config_path).unwrap();
        let parsed: ClientConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, ClientConfig::default());
    }

    #[test]
    fn plain_template_is_written() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("plain.toml");
        generate_config_template(&config_path).unwrap();
        assert!(fs::read_to_string(&config_path).unwrap().contains("[endpoints]"));
    }
}
