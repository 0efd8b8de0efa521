use crate::config::oracle::WINDOW_TIME_FORMAT;
use crate::config::OracleConfig;
use crate::error::{DarwinError, Result};
use crate::types::{round3, SimulationResult, WinLossRatio};
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap();
    static ref PARAMS_END: Regex = Regex::new(r"\}\s+end balance").unwrap();
    static ref END_BALANCE: Regex = Regex::new(r"end balance: (\d+\.\d+) \(").unwrap();
    static ref BUY_HOLD: Regex = Regex::new(r"buy hold: (\d+\.\d+) \(").unwrap();
    static ref VS_BUY_HOLD: Regex = Regex::new(r"vs\. buy hold: (-?\d+\.\d+)%").unwrap();
    static ref WIN_LOSS: Regex = Regex::new(r"win/loss: (\d+)/(\d+)").unwrap();
    static ref ERROR_RATE: Regex = Regex::new(r"error rate: (-?\d+(?:\.\d+)?)%").unwrap();
}

/// Bookkeeping keys dropped from the canonical parameter snapshot
const NON_STRATEGY_KEYS: [&str; 14] = [
    "asset_capital",
    "buy_pct",
    "currency_capital",
    "days",
    "mode",
    "order_adjust_time",
    "population",
    "population_data",
    "sell_pct",
    "start",
    "end",
    "stats",
    "use_strategies",
    "verbose",
];

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Reads the summary an oracle prints at the end of a `sim` run
#[derive(Debug, Clone)]
pub struct ReportGrammar {
    window: usize,
    summary: Option<(String, String)>,
}

impl Default for ReportGrammar {
    fn default() -> Self {
        Self {
            window: 3500,
            summary: None,
        }
    }
}

impl ReportGrammar {
    pub fn new(window: usize, summary: Option<(String, String)>) -> Self {
        Self {
            window: window.max(1),
            summary,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        let summary = match (&config.summary_begin, &config.summary_end) {
            (Some(begin), Some(end)) => Some((begin.clone(), end.clone())),
            _ => None,
        };
        Self::new(config.report_window, summary)
    }

    pub fn parse(&self, raw: &str) -> Result<SimulationResult> {
        let stripped = ANSI_ESCAPE.replace_all(raw, "");
        let window = self.window_of(&stripped);

        let params = echoed_params(window).ok_or_else(|| {
            DarwinError::parse("no parameter echo before end balance", raw)
        })?;
        let end_balance = capture_f64(&END_BALANCE, window)
            .ok_or_else(|| DarwinError::parse("missing end balance", raw))?;
        let buy_hold = capture_f64(&BUY_HOLD, window)
            .ok_or_else(|| DarwinError::parse("missing buy hold", raw))?;
        let vs_buy_hold = capture_f64(&VS_BUY_HOLD, window)
            .ok_or_else(|| DarwinError::parse("missing vs. buy hold", raw))?;

        let (wins, losses) = WIN_LOSS
            .captures(window)
            .and_then(|c| Some((c[1].parse::<u32>().ok()?, c[2].parse::<u32>().ok()?)))
            .unwrap_or((0, 0));
        let error_rate = capture_f64(&ERROR_RATE, window).unwrap_or(0.0);

        let capital = params
            .get("currency_capital")
            .and_then(number)
            .filter(|c| *c > 0.0)
            .ok_or_else(|| DarwinError::parse("echoed currency_capital missing or zero", raw))?;

        let start = params.get("start").and_then(number).map(|v| v as i64);
        let end = params.get("end").and_then(number).map(|v| v as i64);
        let days = params
            .get("days")
            .and_then(number)
            .map(|d| d as i64)
            .or_else(|| match (start, end) {
                (Some(s), Some(e)) if e > s => Some((e - s + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY),
                _ => None,
            })
            .filter(|d| *d > 0)
            .ok_or_else(|| DarwinError::parse("cannot determine simulated days", raw))?
            as u32;

        let selector = params.get("selector").map(normalized_selector).unwrap_or_default();
        let strategy = params
            .get("strategy")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(SimulationResult {
            selector,
            strategy,
            end_balance,
            buy_hold,
            vs_buy_hold,
            wins,
            losses,
            error_rate,
            period_length: params.get("period_length").map(text),
            min_periods: params.get("min_periods").and_then(number).map(|v| v as i64),
            markdown_buy_pct: params.get("markdown_buy_pct").and_then(number),
            markup_sell_pct: params.get("markup_sell_pct").and_then(number),
            order_type: params.get("order_type").map(text),
            days,
            roi: round3((end_balance - capital) / capital * 100.0),
            wl_ratio: WinLossRatio::from_counts(wins, losses),
            frequency: round3((u64::from(wins) + u64::from(losses)) as f64 / days as f64),
            fitness: 0.0,
            params: canonical_params(&params, start, end),
        })
    }

    /// The delimited summary block when present, else the trailing window
    fn window_of<'a>(&self, text: &'a str) -> &'a str {
        if let Some((begin, end)) = &self.summary {
            if let Some(open) = text.rfind(begin.as_str()) {
                let body = &text[open + begin.len()..];
                if let Some(close) = body.find(end.as_str()) {
                    return &body[..close];
                }
            }
        }

        let mut cut = text.len().saturating_sub(self.window);
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        &text[cut..]
    }
}

/// The JSON object whose closing brace directly precedes "end balance".
/// Starts from the earliest `{` that still yields a parseable object.
fn echoed_params(window: &str) -> Option<Map<String, Value>> {
    let close = PARAMS_END.find(window)?.start();
    let body = &window[..=close];
    body.match_indices('{').find_map(|(open, _)| {
        serde_json::from_str::<Map<String, Value>>(&body[open..]).ok()
    })
}

fn capture_f64(pattern: &Regex, text: &str) -> Option<f64> {
    pattern.captures(text)?.get(1)?.as_str().parse().ok()
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalized_selector(value: &Value) -> String {
    match value {
        Value::Object(map) => map.get("normalized").map(text).unwrap_or_default(),
        other => text(other),
    }
}

fn format_millis(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|t| t.format(WINDOW_TIME_FORMAT).to_string())
}

fn canonical_params(
    params: &Map<String, Value>,
    start: Option<i64>,
    end: Option<i64>,
) -> BTreeMap<String, Value> {
    let mut canonical: BTreeMap<String, Value> = params
        .iter()
        .filter(|(key, _)| !NON_STRATEGY_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if let Some(selector) = params.get("selector") {
        canonical.insert("selector".to_string(), Value::String(normalized_selector(selector)));
    }

    let start = start.filter(|s| *s > 0).and_then(format_millis);
    let end = end.filter(|e| *e > 0).and_then(format_millis);
    let windowed = start.is_some() || end.is_some();
    if let Some(start) = start {
        canonical.insert("start".to_string(), Value::String(start));
    }
    if let Some(end) = end {
        canonical.insert("end".to_string(), Value::String(end));
    }
    if !windowed {
        if let Some(days) = params.get("days") {
            canonical.insert("days".to_string(), days.clone());
        }
    }

    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\u{1b}[32mfetching trades...\u{1b}[39m\n\
        {\n  \"selector\": {\"exchange_id\": \"gdax\", \"product_id\": \"BTC-USD\", \"normalized\": \"gdax.BTC-USD\"},\n\
        \"strategy\": \"rsi\",\n  \"period_length\": \"15m\",\n  \"min_periods\": 52,\n  \"rsi_periods\": 14,\n\
        \"order_type\": \"maker\",\n  \"days\": 20,\n  \"currency_capital\": 1000,\n  \"asset_capital\": 0,\n\
        \"mode\": \"sim\",\n  \"stats\": false\n}\n\
        end balance: \u{1b}[33m1234.56\u{1b}[39m (23.45%)\n\
        buy hold: 1000.00 (0.00%)\n\
        vs. buy hold: \u{1b}[32m5.25%\u{1b}[39m\n\
        20 trades over 20 days (avg 1.00 trades/day)\n\
        win/loss: 12/8\n\
        error rate: 40.00%\n";

    #[test]
    fn test_parse_canned_report() {
        let result = ReportGrammar::default().parse(REPORT).unwrap();

        assert_eq!(result.end_balance, 1234.56);
        assert_eq!(result.buy_hold, 1000.0);
        assert_eq!(result.vs_buy_hold, 5.25);
        assert_eq!(result.wins, 12);
        assert_eq!(result.losses, 8);
        assert_eq!(result.error_rate, 40.0);
        assert_eq!(result.roi, 23.456);
        assert_eq!(result.wl_ratio, WinLossRatio::Ratio(1.5));
        assert_eq!(result.frequency, 1.0);
        assert_eq!(result.days, 20);
        assert_eq!(result.selector, "gdax.BTC-USD");
        assert_eq!(result.strategy, "rsi");
        assert_eq!(result.period_length.as_deref(), Some("15m"));
        assert_eq!(result.min_periods, Some(52));
    }

    #[test]
    fn test_canonical_params_strip_bookkeeping() {
        let result = ReportGrammar::default().parse(REPORT).unwrap();
        let params = &result.params;

        assert_eq!(params.get("selector"), Some(&Value::String("gdax.BTC-USD".into())));
        assert_eq!(params.get("days"), Some(&serde_json::json!(20)));
        assert_eq!(params.get("rsi_periods"), Some(&serde_json::json!(14)));
        for key in ["currency_capital", "asset_capital", "mode", "stats"] {
            assert!(!params.contains_key(key), "{} should be stripped", key);
        }
    }

    #[test]
    fn test_huge_trade_counts_do_not_overflow() {
        let busy = REPORT.replace("win/loss: 12/8", "win/loss: 4294967295/4294967295");
        let result = ReportGrammar::default().parse(&busy).unwrap();
        assert_eq!(result.wins, u32::MAX);
        assert_eq!(result.frequency, 429_496_729.5);
        assert_eq!(result.wl_ratio, WinLossRatio::Ratio(1.0));
    }

    #[test]
    fn test_missing_end_balance_is_a_parse_error() {
        let broken = REPORT.replace("end balance", "final balance");
        let result = ReportGrammar::default().parse(&broken);
        assert!(matches!(result, Err(DarwinError::ReportParse { .. })));
    }

    #[test]
    fn test_optional_tokens_default_to_zero() {
        let sparse = REPORT
            .replace("win/loss: 12/8\n", "")
            .replace("error rate: 40.00%\n", "");
        let result = ReportGrammar::default().parse(&sparse).unwrap();
        assert_eq!(result.wins, 0);
        assert_eq!(result.losses, 0);
        assert_eq!(result.error_rate, 0.0);
        assert_eq!(result.wl_ratio, WinLossRatio::Ratio(0.0));
        assert_eq!(result.frequency, 0.0);
    }

    #[test]
    fn test_explicit_window_is_formatted() {
        // 2024-03-01 00:00 and 2024-03-11 00:00 UTC
        let windowed = REPORT.replace(
            "\"days\": 20,",
            "\"start\": 1709251200000, \"end\": 1710115200000,",
        );
        let result = ReportGrammar::default().parse(&windowed).unwrap();
        assert_eq!(result.days, 10);
        assert_eq!(result.params.get("start"), Some(&Value::String("202403010000".into())));
        assert_eq!(result.params.get("end"), Some(&Value::String("202403110000".into())));
        assert!(!result.params.contains_key("days"));
    }

    #[test]
    fn test_trailing_window_hides_early_output() {
        let noisy = format!("{}{}", REPORT, "é".repeat(4000));
        let result = ReportGrammar::default().parse(&noisy);
        assert!(result.is_err());

        let grammar = ReportGrammar::new(20_000, None);
        assert!(grammar.parse(&noisy).is_ok());
    }

    #[test]
    fn test_summary_markers_bound_the_window() {
        let framed = format!("<<<\n{}>>>\n{}", REPORT, "trailing noise ".repeat(400));
        let grammar = ReportGrammar::new(100, Some(("<<<".into(), ">>>".into())));
        let result = grammar.parse(&framed).unwrap();
        assert_eq!(result.wins, 12);
    }
}
