//! # AlphaStrat client
//!
//! Builds trading-strategy graphs, normalizes them into the canonical strategy
//! form and drives the two remote services behind AlphaStrat: the compiler
//! backend (indicator catalog and code generation) and the engine (backtests,
//! pipeline configs, gateway and pipeline control, status and logs).

pub use crate::utils::error::{Error, Result};

pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod configs;
pub mod graph;
pub mod monitor;
pub mod orchestrator;
pub mod utils;

pub use api::{EngineApi, HttpEngineClient};
pub use config::ClientConfig;
pub use graph::{normalize, NormalizedStrategy, StrategyGraph};
