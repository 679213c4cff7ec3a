//! Trailing-twelve-month metrics over four consecutive quarterly reports.
//!
//! Flow ratios are recomputed from summed flow components, never averaged
//! from quarterly ratios. Balance-sheet denominators use the mean of the
//! four quarter-end balances. All results are in percent, like the stored
//! ratio columns.

use crate::domain::quarter_index;
use chrono::NaiveDate;

/// Components of one quarterly report that feed the TTM window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarterReport {
    pub report_date: NaiveDate,
    pub operating_revenue: Option<f64>,
    pub operating_cost: Option<f64>,
    pub net_profit: Option<f64>,
    pub ebit: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_equity: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TtmMetrics {
    pub roe_ttm: Option<f64>,
    pub roa_ttm: Option<f64>,
    pub roa_ebit_ttm: Option<f64>,
    pub gross_income_ratio_ttm: Option<f64>,
    pub net_profit_ratio_ttm: Option<f64>,
}

impl TtmMetrics {
    pub const FIELDS: [&'static str; 5] = [
        "roe_ttm",
        "roa_ttm",
        "roa_ebit_ttm",
        "gross_income_ratio_ttm",
        "net_profit_ratio_ttm",
    ];

    pub fn values(&self) -> [Option<f64>; 5] {
        [
            self.roe_ttm,
            self.roa_ttm,
            self.roa_ebit_ttm,
            self.gross_income_ratio_ttm,
            self.net_profit_ratio_ttm,
        ]
    }
}

/// A metric left null because its denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroDenominator {
    pub field: &'static str,
}

/// The four reports ending at `end` (inclusive), if they are four
/// consecutive quarters. `reports` must be sorted by report date.
pub fn window(reports: &[QuarterReport], end: usize) -> Option<&[QuarterReport]> {
    if end < 3 || end >= reports.len() {
        return None;
    }
    let w = &reports[end - 3..=end];
    let contiguous = w
        .windows(2)
        .all(|p| quarter_index(p[1].report_date) == quarter_index(p[0].report_date) + 1);
    contiguous.then_some(w)
}

/// Compute every TTM metric over a window of four reports.
pub fn compute(window: &[QuarterReport]) -> (TtmMetrics, Vec<ZeroDenominator>) {
    let sum = |f: fn(&QuarterReport) -> Option<f64>| -> Option<f64> {
        window.iter().map(f).sum::<Option<f64>>()
    };
    let mean = |f: fn(&QuarterReport) -> Option<f64>| -> Option<f64> {
        sum(f).map(|s| s / window.len() as f64)
    };

    let revenue = sum(|r| r.operating_revenue);
    let cost = sum(|r| r.operating_cost);
    let profit = sum(|r| r.net_profit);
    let ebit = sum(|r| r.ebit);
    let assets = mean(|r| r.total_assets);
    let equity = mean(|r| r.total_equity);

    let mut zeros = Vec::new();
    let mut ratio = |field: &'static str, num: Option<f64>, den: Option<f64>| -> Option<f64> {
        let (num, den) = (num?, den?);
        if den == 0.0 {
            zeros.push(ZeroDenominator { field });
            return None;
        }
        Some(100.0 * num / den)
    };

    let metrics = TtmMetrics {
        roe_ttm: ratio("roe_ttm", profit, equity),
        roa_ttm: ratio("roa_ttm", profit, assets),
        roa_ebit_ttm: ratio("roa_ebit_ttm", ebit, assets),
        gross_income_ratio_ttm: ratio(
            "gross_income_ratio_ttm",
            revenue.zip(cost).map(|(r, c)| r - c),
            revenue,
        ),
        net_profit_ratio_ttm: ratio("net_profit_ratio_ttm", profit, revenue),
    };
    (metrics, zeros)
}

/// TTM for the window ending at `end`; all-null when the window is incomplete.
pub fn ttm_at(reports: &[QuarterReport], end: usize) -> (TtmMetrics, Vec<ZeroDenominator>) {
    match window(reports, end) {
        Some(w) => compute(w),
        None => (TtmMetrics::default(), Vec::new()),
    }
}
