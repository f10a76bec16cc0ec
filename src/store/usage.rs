//! Usage arithmetic for the cost dashboard.

use chrono::NaiveDate;

use crate::dates::month_start;
use crate::model::{round_to, UsageCounter, UsageMetrics};

/// Per-report cost never drops below this when projecting remaining reports.
const MIN_REPORT_UNIT_COST: f64 = 0.01;

pub fn compute_usage_metrics(
    rows: &[UsageCounter],
    today: NaiveDate,
    balance: Option<f64>,
    fallback_balance: f64,
) -> UsageMetrics {
    let todays: Vec<&UsageCounter> = rows.iter().filter(|r| r.day == today).collect();
    let today_cost: f64 = todays.iter().map(|r| r.cost_usd).sum();
    let today_tokens_in = todays.iter().map(|r| r.tokens_in).sum();
    let today_tokens_out = todays.iter().map(|r| r.tokens_out).sum();
    let today_calls = todays.iter().map(|r| r.calls).sum();

    let week_start = today - chrono::Duration::days(7);
    let last_week: Vec<&UsageCounter> = rows
        .iter()
        .filter(|r| r.day >= week_start && r.day <= today)
        .collect();
    let avg_7d_cost = if last_week.is_empty() {
        today_cost
    } else {
        last_week.iter().map(|r| r.cost_usd).sum::<f64>() / 7.0
    };

    let first = month_start(today);
    let month_total: f64 = rows
        .iter()
        .filter(|r| r.day >= first && r.day <= today)
        .map(|r| r.cost_usd)
        .sum();

    let balance = balance.unwrap_or(fallback_balance);
    let unit = avg_7d_cost.max(today_cost).max(MIN_REPORT_UNIT_COST);
    let remaining_reports = if balance > 0.0 {
        (balance / unit).floor() as u64
    } else {
        0
    };

    UsageMetrics {
        today_cost: round_to(today_cost, 4),
        today_tokens_in,
        today_tokens_out,
        today_calls,
        avg_7d_cost: round_to(avg_7d_cost, 4),
        balance: round_to(balance, 2),
        remaining_reports,
        month_total: round_to(month_total, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: NaiveDate, model: &str, calls: u64, cost: f64) -> UsageCounter {
        UsageCounter {
            day,
            model_name: model.to_string(),
            calls,
            tokens_in: calls * 100,
            tokens_out: calls * 10,
            cost_usd: cost,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_history_uses_fallback_balance_and_floor_cost() {
        let m = compute_usage_metrics(&[], d(2025, 5, 10), None, 5.0);
        assert_eq!(m.today_cost, 0.0);
        assert_eq!(m.avg_7d_cost, 0.0);
        assert_eq!(m.balance, 5.0);
        // 5.0 / 0.01
        assert_eq!(m.remaining_reports, 500);
    }

    #[test]
    fn sums_today_across_models_and_averages_week() {
        let today = d(2025, 5, 10);
        let rows = vec![
            row(today, "claude-3-5-sonnet-20241022", 3, 0.30),
            row(today, "gemini-1.5-flash", 2, 0.05),
            row(d(2025, 5, 8), "claude-3-5-sonnet-20241022", 7, 0.35),
            row(d(2025, 4, 30), "claude-3-5-sonnet-20241022", 1, 1.00),
        ];
        let m = compute_usage_metrics(&rows, today, Some(10.0), 5.0);
        assert_eq!(m.today_calls, 5);
        assert_eq!(m.today_tokens_in, 500);
        assert_eq!(m.today_cost, 0.35);
        // (0.30 + 0.05 + 0.35) / 7; the April row is older than a week.
        assert_eq!(m.avg_7d_cost, 0.1);
        // April row is outside May.
        assert_eq!(m.month_total, 0.7);
        assert_eq!(m.balance, 10.0);
        // unit = max(0.1, 0.35) = 0.35 -> floor(10 / 0.35) = 28
        assert_eq!(m.remaining_reports, 28);
    }
}
