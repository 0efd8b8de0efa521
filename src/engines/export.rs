use crate::config::ExportConfig;
use crate::error::{DarwinError, Result};
use crate::types::Phenotype;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Directory the three artifacts were written to
    Written(PathBuf),
    Skipped(String),
}

/// Persists a strategy's best result once it clears the export thresholds.
/// Never feeds back into evolution.
#[derive(Debug, Clone)]
pub struct ExportGate {
    config: ExportConfig,
}

impl ExportGate {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Reason the phenotype falls short, if it does
    pub fn rejection(&self, best: &Phenotype) -> Option<String> {
        let Some(sim) = best.sim.as_ref() else {
            return Some("no simulation result".to_string());
        };
        if sim.roi <= self.config.min_roi {
            return Some(format!("roi {} <= {}", sim.roi, self.config.min_roi));
        }
        if sim.vs_buy_hold < self.config.min_vs_buy_hold {
            return Some(format!(
                "vs. buy hold {} < {}",
                sim.vs_buy_hold, self.config.min_vs_buy_hold
            ));
        }
        if !sim.wl_ratio.exceeds(self.config.min_win_loss_ratio) {
            return Some(format!(
                "win/loss ratio {} <= {}",
                sim.wl_ratio, self.config.min_win_loss_ratio
            ));
        }
        None
    }

    /// Writes `<strategy>.conf.json`, `<strategy>_results.json` and
    /// `<strategy>_data.json` under `<export_dir>/<selector>/<days>/`
    pub fn offer(&self, best: &Phenotype, dataset_json: &str) -> Result<ExportOutcome> {
        if let Some(reason) = self.rejection(best) {
            match best.sim.as_ref() {
                Some(sim) => log::info!(
                    "Not writing new config ({}): roi: {}, wins: {}, losses: {}, vsBuyHold: {}",
                    reason,
                    sim.roi,
                    sim.wins,
                    sim.losses,
                    sim.vs_buy_hold
                ),
                None => log::info!("Not writing new config: {}", reason),
            }
            return Ok(ExportOutcome::Skipped(reason));
        }
        let Some(sim) = best.sim.as_ref() else {
            return Ok(ExportOutcome::Skipped("no simulation result".to_string()));
        };

        let dir = self
            .config
            .export_dir
            .join(&sim.selector)
            .join(sim.days.to_string());
        fs::create_dir_all(&dir).map_err(|e| DarwinError::persistence(&dir, e))?;

        write(&dir.join(format!("{}.conf.json", sim.strategy)), &serde_json::to_string_pretty(&sim.params)?)?;
        write(&dir.join(format!("{}_results.json", sim.strategy)), &serde_json::to_string_pretty(best)?)?;
        write(&dir.join(format!("{}_data.json", sim.strategy)), dataset_json)?;

        log::info!(
            "Exported {} (roi {}%, vs. buy hold {}%) to {}",
            sim.strategy,
            sim.roi,
            sim.vs_buy_hold,
            dir.display()
        );
        Ok(ExportOutcome::Written(dir))
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| DarwinError::persistence(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SimulationResult, TraitValue, WinLossRatio};
    use std::collections::BTreeMap;

    fn best(roi: f64, vs_buy_hold: f64, wins: u32, losses: u32) -> Phenotype {
        let mut traits = BTreeMap::new();
        traits.insert("trend_ema".to_string(), TraitValue::Int(26));
        let mut params = BTreeMap::new();
        params.insert("selector".to_string(), serde_json::json!("gdax.BTC-USD"));
        params.insert("trend_ema".to_string(), serde_json::json!(26));

        Phenotype {
            traits,
            sim: Some(SimulationResult {
                selector: "gdax.BTC-USD".into(),
                strategy: "trend_ema".into(),
                end_balance: 1000.0 + roi * 10.0,
                buy_hold: 1000.0,
                vs_buy_hold,
                wins,
                losses,
                error_rate: 0.0,
                period_length: None,
                min_periods: None,
                markdown_buy_pct: None,
                markup_sell_pct: None,
                order_type: None,
                days: 14,
                roi,
                wl_ratio: WinLossRatio::from_counts(wins, losses),
                frequency: 0.5,
                fitness: 1.0,
                params,
            }),
        }
    }

    fn gate(dir: &Path) -> ExportGate {
        ExportGate::new(ExportConfig {
            export_dir: dir.to_path_buf(),
            ..Default::default()
        })
    }

    #[test]
    fn test_passing_result_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = gate(dir.path()).offer(&best(12.0, 4.0, 3, 2), "{}").unwrap();

        let target = dir.path().join("gdax.BTC-USD").join("14");
        assert_eq!(outcome, ExportOutcome::Written(target.clone()));

        let conf: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(target.join("trend_ema.conf.json")).unwrap()).unwrap();
        assert_eq!(conf.get("trend_ema"), Some(&serde_json::json!(26)));
        assert!(target.join("trend_ema_results.json").exists());
        assert_eq!(fs::read_to_string(target.join("trend_ema_data.json")).unwrap(), "{}");
    }

    #[test]
    fn test_thresholds_skip() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());

        assert!(matches!(gate.offer(&best(5.0, 4.0, 3, 2), "{}").unwrap(), ExportOutcome::Skipped(_)));
        assert!(matches!(gate.offer(&best(12.0, 1.9, 3, 2), "{}").unwrap(), ExportOutcome::Skipped(_)));
        assert!(matches!(gate.offer(&best(12.0, 4.0, 1, 5), "{}").unwrap(), ExportOutcome::Skipped(_)));
        assert!(matches!(gate.offer(&Phenotype::default(), "{}").unwrap(), ExportOutcome::Skipped(_)));
        assert!(!dir.path().join("gdax.BTC-USD").exists());
    }

    #[test]
    fn test_skip_reason_names_failed_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());

        let outcome = gate.offer(&best(-3.0, 4.0, 3, 2), "{}").unwrap();
        assert_eq!(outcome, ExportOutcome::Skipped("roi -3 <= 5".to_string()));
        match gate.offer(&best(12.0, 1.5, 3, 2), "{}").unwrap() {
            ExportOutcome::Skipped(reason) => assert!(reason.starts_with("vs. buy hold 1.5")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unbounded_ratio_passes() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = gate(dir.path()).offer(&best(12.0, 2.0, 3, 0), "{}").unwrap();
        assert!(matches!(outcome, ExportOutcome::Written(_)));
    }

    #[test]
    fn test_export_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());
        let phenotype = best(12.0, 4.0, 3, 2);
        let first = gate.offer(&phenotype, "{}").unwrap();
        let second = gate.offer(&phenotype, "{}").unwrap();
        assert_eq!(first, second);
    }
}
