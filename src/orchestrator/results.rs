//! Presentation helpers for finished backtests.

use serde::Serialize;

use crate::api::{BacktestResult, EquityPoint};

/// Most points kept when an equity curve is drawn.
pub const MAX_CHART_POINTS: usize = 200;
const DEFAULT_EQUITY: f64 = 10_000.0;

/// Headline numbers of a finished backtest, with missing metrics defaulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub starting_equity: f64,
    pub ending_equity: f64,
    pub total_trades: u64,
    pub used_default_strategy: bool,
}

impl From<&BacktestResult> for ResultSummary {
    fn from(result: &BacktestResult) -> Self {
        let m = &result.metrics;
        let total_trades = match result.total_trades {
            | Some(n) if n > 0 => n,
            | _ => result.trades.len() as u64,
        };
        Self {
            total_return: m.total_return.unwrap_or(0.0),
            max_drawdown: m.max_drawdown.unwrap_or(0.0),
            sharpe: m.sharpe_approx.or(m.sharpe_ratio).unwrap_or(0.0),
            starting_equity: m.starting_equity.unwrap_or(DEFAULT_EQUITY),
            ending_equity: m.ending_equity.unwrap_or(DEFAULT_EQUITY),
            total_trades,
            used_default_strategy: result.used_default_strategy.unwrap_or(false),
        }
    }
}

/// Thin an equity curve to at most `max` points, always keeping the last one.
pub fn downsample(curve: &[EquityPoint], max: usize) -> Vec<EquityPoint> {
    if curve.len() <= max {
        return curve.to_vec();
    }
    let Some(last) = curve.len().checked_sub(1) else {
        return Vec::new();
    };
    if max < 2 {
        return curve[last..].iter().take(max).cloned().collect();
    }
    let step = (last + max - 2) / (max - 1);
    let mut out: Vec<EquityPoint> = (0..last).step_by(step).map(|i| curve[i].clone()).collect();
    out.push(curve[last].clone());
    out
}

/// `0s`, `42s`, `3m 7s`.
pub fn format_elapsed(secs: f64) -> String {
    if secs.is_nan() || secs <= 0.0 {
        return "0s".to_string();
    }
    if secs < 60.0 {
        return format!("{}s", secs.round() as u64);
    }
    format!("{}m {}s", (secs / 60.0).floor() as u64, (secs % 60.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BacktestMetrics, Trade};

    fn curve(n: usize) -> Vec<EquityPoint> {
        (0..n).map(|i| EquityPoint { ts: None, equity: i as f64 }).collect()
    }

    #[test]
    fn summary_defaults_missing_metrics() {
        let s = ResultSummary::from(&BacktestResult::default());
        assert_eq!(s.total_return, 0.0);
        assert_eq!(s.starting_equity, 10_000.0);
        assert_eq!(s.ending_equity, 10_000.0);
        assert_eq!(s.total_trades, 0);
        assert!(!s.used_default_strategy);
    }

    #[test]
    fn summary_prefers_sharpe_approx_and_counts_trades() {
        let result = BacktestResult {
            metrics: BacktestMetrics { sharpe_ratio: Some(0.8), ..Default::default() },
            trades: vec![Trade::default(), Trade::default()],
            total_trades: Some(0),
            ..Default::default()
        };
        let s = ResultSummary::from(&result);
        assert_eq!(s.sharpe, 0.8);
        assert_eq!(s.total_trades, 2);

        let result = BacktestResult {
            metrics: BacktestMetrics { sharpe_approx: Some(1.2), sharpe_ratio: Some(0.8), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(ResultSummary::from(&result).sharpe, 1.2);
    }

    #[test]
    fn short_curves_are_untouched() {
        assert_eq!(downsample(&curve(150), MAX_CHART_POINTS), curve(150));
    }

    #[test]
    fn long_curves_are_thinned_and_keep_the_last_point() {
        for n in [201, 400, 401, 999, 5_000] {
            let out = downsample(&curve(n), MAX_CHART_POINTS);
            assert!(out.len() <= MAX_CHART_POINTS, "n={n} len={}", out.len());
            assert_eq!(out.first().map(|p| p.equity), Some(0.0));
            assert_eq!(out.last().map(|p| p.equity), Some((n - 1) as f64));
            assert!(out.windows(2).all(|w| w[0].equity < w[1].equity));
        }
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(0.0), "0s");
        assert_eq!(format_elapsed(f64::NAN), "0s");
        assert_eq!(format_elapsed(42.4), "42s");
        assert_eq!(format_elapsed(187.0), "3m 7s");
    }
}
