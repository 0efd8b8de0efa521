use super::traits::ConfigSection;
use crate::error::DarwinError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendar format the oracle accepts for `--start` / `--end`
pub const WINDOW_TIME_FORMAT: &str = "%Y%m%d%H%M";

/// How the simulation oracle is invoked and how its report is read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Executable, e.g. `./zenbot.sh`
    pub command: String,
    /// Market selector, e.g. `bitfinex.ETH-USD`
    pub selector: String,
    pub days: Option<u32>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub currency_capital: f64,
    pub asset_capital: f64,
    /// Passed through verbatim as `--key=value`
    pub extra_args: BTreeMap<String, String>,
    pub backfill: bool,
    pub timeout_secs: Option<u64>,
    /// Concurrent simulations; host parallelism when unset
    pub parallel_limit: Option<usize>,
    /// Trailing characters of the report the parser looks at
    pub report_window: usize,
    pub summary_begin: Option<String>,
    pub summary_end: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let mut extra_args = BTreeMap::new();
        extra_args.insert("filename".to_string(), "none".to_string());

        Self {
            command: if cfg!(windows) { "zenbot.bat" } else { "./zenbot.sh" }.to_string(),
            selector: "bitfinex.ETH-USD".to_string(),
            days: Some(10),
            start: None,
            end: None,
            currency_capital: 1000.0,
            asset_capital: 0.0,
            extra_args,
            backfill: true,
            timeout_secs: None,
            parallel_limit: None,
            report_window: 3500,
            summary_begin: None,
            summary_end: None,
        }
    }
}

impl OracleConfig {
    pub fn worker_count(&self) -> usize {
        self.parallel_limit
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Length of the simulation window in days.
    ///
    /// An explicit `days` wins; otherwise the window runs from `start` (or
    /// from `end`, inclusive) up to `now`.
    pub fn simulation_days(&self, now: DateTime<Utc>) -> Result<u32, DarwinError> {
        if let Some(days) = self.days {
            return Ok(days.max(1));
        }
        if let Some(start) = &self.start {
            let start = parse_window_time(start)?;
            return Ok((now - start).num_days().max(1) as u32);
        }
        if let Some(end) = &self.end {
            let end = parse_window_time(end)?;
            return Ok(((now - end).num_days() + 1).max(1) as u32);
        }
        Err(DarwinError::Configuration(
            "One of oracle.days, oracle.start or oracle.end is required".to_string(),
        ))
    }

    /// Fixed arguments every simulation receives
    pub fn simulation_args(&self) -> Vec<(String, String)> {
        let mut args: Vec<(String, String)> = self
            .extra_args
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(days) = self.days {
            args.push(("days".to_string(), days.to_string()));
        }
        if let Some(start) = &self.start {
            args.push(("start".to_string(), start.clone()));
        }
        if let Some(end) = &self.end {
            args.push(("end".to_string(), end.clone()));
        }
        args.push(("currency_capital".to_string(), self.currency_capital.to_string()));
        args.push(("asset_capital".to_string(), self.asset_capital.to_string()));
        args
    }
}

fn parse_window_time(value: &str) -> Result<DateTime<Utc>, DarwinError> {
    NaiveDateTime::parse_from_str(value, WINDOW_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            DarwinError::Configuration(format!(
                "Invalid window time '{}' (expected YYYYMMDDHHMM): {}",
                value, e
            ))
        })
}

impl ConfigSection for OracleConfig {
    fn section_name() -> &'static str {
        "oracle"
    }

    fn validate(&self) -> Result<(), DarwinError> {
        if self.command.trim().is_empty() {
            return Err(DarwinError::Configuration(
                "Oracle command must not be empty".to_string(),
            ));
        }
        if self.selector.trim().is_empty() {
            return Err(DarwinError::Configuration(
                "Selector must not be empty".to_string(),
            ));
        }
        if self.currency_capital <= 0.0 {
            return Err(DarwinError::Configuration(
                "Currency capital must be positive".to_string(),
            ));
        }
        if self.parallel_limit == Some(0) {
            return Err(DarwinError::Configuration(
                "Parallel limit must be at least 1".to_string(),
            ));
        }
        if self.report_window == 0 {
            return Err(DarwinError::Configuration(
                "Report window must be positive".to_string(),
            ));
        }
        if self.summary_begin.is_some() != self.summary_end.is_some() {
            return Err(DarwinError::Configuration(
                "summary_begin and summary_end must be set together".to_string(),
            ));
        }
        self.simulation_days(Utc::now())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_explicit_days_win() {
        let config = OracleConfig {
            days: Some(20),
            start: Some("202401010000".into()),
            ..Default::default()
        };
        assert_eq!(config.simulation_days(now()).unwrap(), 20);
    }

    #[test]
    fn test_days_from_start_and_end() {
        let from_start = OracleConfig {
            days: None,
            start: Some("202403010000".into()),
            ..Default::default()
        };
        assert_eq!(from_start.simulation_days(now()).unwrap(), 10);

        let from_end = OracleConfig {
            days: None,
            end: Some("202403100000".into()),
            ..Default::default()
        };
        assert_eq!(from_end.simulation_days(now()).unwrap(), 2);
    }

    #[test]
    fn test_missing_window_is_rejected() {
        let config = OracleConfig {
            days: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let bad = OracleConfig {
            days: None,
            start: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(DarwinError::Configuration(_))));
    }

    #[test]
    fn test_simulation_args() {
        let args = OracleConfig::default().simulation_args();
        assert!(args.contains(&("days".to_string(), "10".to_string())));
        assert!(args.contains(&("currency_capital".to_string(), "1000".to_string())));
        assert!(args.contains(&("filename".to_string(), "none".to_string())));
    }
}
