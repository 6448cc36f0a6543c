//! Remote job orchestration: compile requests, backtest jobs and process control.

pub mod backtest;
pub mod compile;
pub mod job;
pub mod process;
pub mod results;

pub use backtest::{BacktestForm, BacktestParams, BacktestRunner, BacktestState};
pub use compile::{load_catalog, Compiler, Platform};
pub use job::{Job, JobStatus, PollTask};
pub use process::{ControlAction, ControlOutcome, GatewayJobState, ProcessController};
pub use results::{downsample, format_elapsed, ResultSummary};
