//! Terminal rendering for status, logs, backtest results and notices.

use colored::{ColoredString, Colorize};

use crate::api::{ConfigSummary, LogLevel, LogLine, RunInfo, ServiceStatus};
use crate::graph::{IndicatorInfo, StrategyGraph};
use crate::monitor::{PipelinePhase, StatusSnapshot};
use crate::orchestrator::backtest::{phase_state, PhaseState, PHASES};
use crate::orchestrator::{downsample, format_elapsed, GatewayJobState, Job, ResultSummary};
use crate::orchestrator::results::MAX_CHART_POINTS;
use crate::api::BacktestResult;
use crate::utils::{Notice, NoticeKind};

fn flag(up: bool, yes: &str, no: &str) -> ColoredString {
    if up {
        yes.green().bold()
    } else {
        no.red()
    }
}

fn pid_suffix(pid: Option<u32>) -> String {
    pid.map(|p| format!(" (pid {p})")).unwrap_or_default()
}

pub fn status_lines(snapshot: &StatusSnapshot) -> Vec<String> {
    let Some(status) = &snapshot.status else {
        return vec!["No status yet (engine unreachable?)".yellow().to_string()];
    };
    let mut lines = service_lines(status, snapshot.pipeline_phase());
    if let Some(at) = snapshot.updated_at {
        lines.push(format!("Updated     {}", at.format("%H:%M:%S")).dimmed().to_string());
    }
    lines
}

fn service_lines(status: &ServiceStatus, phase: PipelinePhase) -> Vec<String> {
    let gw = &status.gateway;
    let pl = &status.pipeline;
    let d = &status.decisions;
    let mut lines = vec![
        format!("Gateway     {}{}", flag(gw.running, "RUNNING", "STOPPED"), pid_suffix(gw.pid)),
        format!("Auth        {}", flag(status.authenticated, "AUTHENTICATED", "NOT AUTHENTICATED")),
        format!("Pipeline    {}{}", flag(pl.running, "RUNNING", "STOPPED"), pid_suffix(pl.pid)),
    ];
    if pl.running {
        lines.push(format!("Phase       {}", phase.label().cyan()));
    }
    if let Some(dir) = &pl.run_dir {
        lines.push(format!("Run dir     {dir}"));
    }
    lines.push(format!("Decisions   {} total, {} action signals", d.total_count, d.action_signal_count));
    if let Some(ts) = &d.last_timestamp {
        lines.push(format!("Last signal {ts}"));
    }
    lines
}

pub fn log_line(line: &LogLine) -> String {
    match line.level {
        | LogLevel::Error => line.text.red().to_string(),
        | LogLevel::Warning => line.text.yellow().to_string(),
        | LogLevel::Debug => line.text.dimmed().to_string(),
        | LogLevel::Info => line.text.clone(),
    }
}

pub fn run_line(run: &RunInfo) -> String {
    let mut parts = vec![run.name.bold().to_string()];
    if run.has_log {
        parts.push("log".to_string());
    }
    if run.has_decisions {
        parts.push("decisions".to_string());
    }
    if let Some(modified) = &run.modified {
        parts.push(modified.dimmed().to_string());
    }
    parts.join("  ")
}

pub fn config_line(config: &ConfigSummary) -> String {
    let symbols: Vec<&str> = config.symbols().collect();
    format!("{:<24} {:<10} {}", config.name.bold(), config.config_type, symbols.join(", "))
}

pub fn indicator_line(info: &IndicatorInfo) -> String {
    format!("{:<12} {:<20} {}", info.id, info.name, info.category.dimmed())
}

pub fn graph_lines(graph: &StrategyGraph) -> Vec<String> {
    let mut lines = vec![format!("{} ({} nodes, {} edges)", graph.display_name().bold(), graph.nodes.len(), graph.edges.len())];
    for node in &graph.nodes {
        let params: Vec<String> = node.parameters.iter().map(|(k, v)| format!("{k}={v}")).collect();
        lines.push(format!("  {:<14} {:<10} {}", node.id, node.kind.canonical_type(), params.join(" ")));
    }
    for (i, edge) in graph.edges.iter().enumerate() {
        let input = edge.label();
        let input = if input.is_empty() { String::new() } else { format!(" [{input}]") };
        lines.push(format!("  #{i} {} -> {}{input}", edge.source, edge.target));
    }
    lines
}

/// One-line phase strip, e.g. `[x] converting  [>] downloading  [ ] processing`.
pub fn phase_strip(reported: Option<&str>) -> String {
    PHASES
        .iter()
        .map(|p| match phase_state(*p, reported) {
            | PhaseState::Done => format!("[x] {}", p.as_str()).green().to_string(),
            | PhaseState::Current => format!("[>] {}", p.as_str()).cyan().bold().to_string(),
            | PhaseState::Pending => format!("[ ] {}", p.as_str()).dimmed().to_string(),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn backtest_lines(job: &Job<BacktestResult>) -> Vec<String> {
    let Some(result) = &job.result else {
        return vec![format!("Job {} finished without a result", job.id)];
    };
    let s = ResultSummary::from(result);
    let ret = format!("{:.2}%", s.total_return * 100.0);
    let ret = if s.total_return >= 0.0 { ret.green() } else { ret.red() };
    let mut lines = vec![
        format!("Job          {} ({})", job.id, format_elapsed(job.elapsed_seconds)),
        format!("Return       {ret}"),
        format!("Max drawdown {:.2}%", s.max_drawdown * 100.0),
        format!("Sharpe       {:.2}", s.sharpe),
        format!("Equity       {:.2} -> {:.2}", s.starting_equity, s.ending_equity),
        format!("Trades       {}", s.total_trades),
    ];
    if s.used_default_strategy {
        lines.push("Engine fell back to its default strategy".yellow().to_string());
    }
    let curve = downsample(&result.equity_curve, MAX_CHART_POINTS);
    if let (Some(lo), Some(hi)) = (
        curve.iter().map(|p| p.equity).reduce(f64::min),
        curve.iter().map(|p| p.equity).reduce(f64::max),
    ) {
        lines.push(format!("Equity range {lo:.2} .. {hi:.2} over {} points", curve.len()));
    }
    for trade in result.trades.iter().take(10) {
        lines.push(format!(
            "  {:<10} {:<6} {:<5} {:>8} @ {:.2}",
            trade.date(),
            trade.symbol.as_deref().unwrap_or("-"),
            trade.action.as_deref().unwrap_or("-"),
            trade.qty.unwrap_or(0.0),
            trade.price_value()
        ));
    }
    lines
}

pub fn gateway_line(state: &GatewayJobState) -> String {
    match state {
        | GatewayJobState::Idle => "Gateway idle".to_string(),
        | GatewayJobState::Starting { message, .. } => message.cyan().to_string(),
        | GatewayJobState::Running { pid } => format!("Gateway is running{}", pid_suffix(*pid)).green().to_string(),
        | GatewayJobState::ScriptExited { message } => message.yellow().to_string(),
        | GatewayJobState::Failed { message } => message.red().to_string(),
    }
}

pub fn notice_line(notice: &Notice) -> String {
    match notice.kind {
        | NoticeKind::Success => format!("✓ {}", notice.text).green().to_string(),
        | NoticeKind::Error => format!("✗ {}", notice.text).red().to_string(),
        | NoticeKind::Info => format!("• {}", notice.text),
    }
}
