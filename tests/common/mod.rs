//! Stub engine plumbing shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use alphastrat::config::{EndpointsConfig, PollingConfig, TimeoutsConfig};
use alphastrat::{EngineApi, HttpEngineClient};
use axum::Router;

/// Serve `app` on an ephemeral port and return its base URL.
pub fn serve(app: Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.set_nonblocking(true).expect("nonblocking");
    let addr = listener.local_addr().expect("local_addr");
    let server = axum::Server::from_tcp(listener).expect("from_tcp").serve(app.into_make_service());
    tokio::spawn(server);
    format!("http://{addr}")
}

/// Client pointing both services at `base`.
pub fn client(base: &str) -> HttpEngineClient {
    let endpoints = EndpointsConfig { compiler_url: base.to_string(), engine_url: base.to_string() };
    HttpEngineClient::new(&endpoints, TimeoutsConfig::default()).expect("client")
}

/// Client whose reads give up after one second.
pub fn impatient_client(base: &str) -> HttpEngineClient {
    let endpoints = EndpointsConfig { compiler_url: base.to_string(), engine_url: base.to_string() };
    let timeouts = TimeoutsConfig { read_secs: 1, ..TimeoutsConfig::default() };
    HttpEngineClient::new(&endpoints, timeouts).expect("client")
}

pub fn api(base: &str) -> Arc<dyn EngineApi> {
    Arc::new(client(base))
}

/// Poll cadence shrunk so jobs finish in milliseconds.
pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        backtest_ms: 20,
        gateway_job_ms: 20,
        status_ms: 50,
        refresh_delay_ms: 10,
        gateway_grace_ms: 10,
        ..PollingConfig::default()
    }
}

pub const WAIT: Duration = Duration::from_secs(10);
