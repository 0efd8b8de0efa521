use crate::error::{DarwinError, Result};
use crate::types::{Phenotype, SimulationResult};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// What one generation produced: every strategy's population and the
/// ranked results of the trials that cleared the viability cutoffs
#[derive(Debug, Clone, Default)]
pub struct GenerationRecord {
    pub generation: usize,
    pub leaderboard: Vec<SimulationResult>,
    pub populations: BTreeMap<String, Vec<Phenotype>>,
}

/// Parts of the snapshot file names shared by one run
#[derive(Debug, Clone)]
pub struct RecordNaming {
    pub selector: String,
    pub strategies_label: String,
    pub timestamp: i64,
}

impl RecordNaming {
    fn stem(&self, generation: usize) -> String {
        format!(
            "{}_{}_{}_gen_{}",
            self.selector, self.strategies_label, self.timestamp, generation
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPaths {
    pub leaderboard: PathBuf,
    pub populations: PathBuf,
}

impl GenerationRecord {
    /// Sorts the leaderboard by fitness, best first
    pub fn new(
        generation: usize,
        mut leaderboard: Vec<SimulationResult>,
        populations: BTreeMap<String, Vec<Phenotype>>,
    ) -> Self {
        leaderboard.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self {
            generation,
            leaderboard,
            populations,
        }
    }

    pub fn population_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.populations)?)
    }

    pub fn leaderboard_frame(&self) -> Result<DataFrame> {
        let rows = &self.leaderboard;
        let params: Vec<String> = rows
            .iter()
            .map(|r| serde_json::to_string(&r.params))
            .collect::<std::result::Result<_, _>>()?;

        let df = df! {
            "Selector" => rows.iter().map(|r| r.selector.clone()).collect::<Vec<_>>(),
            "Fitness" => rows.iter().map(|r| r.fitness).collect::<Vec<_>>(),
            "VS Buy Hold (%)" => rows.iter().map(|r| r.vs_buy_hold).collect::<Vec<_>>(),
            "Win/Loss Ratio" => rows.iter().map(|r| r.wl_ratio.to_string()).collect::<Vec<_>>(),
            "# Trades/Day" => rows.iter().map(|r| r.frequency).collect::<Vec<_>>(),
            "Strategy" => rows.iter().map(|r| r.strategy.clone()).collect::<Vec<_>>(),
            "Order Type" => rows.iter().map(|r| r.order_type.clone()).collect::<Vec<_>>(),
            "Ending Balance ($)" => rows.iter().map(|r| r.end_balance).collect::<Vec<_>>(),
            "Buy Hold ($)" => rows.iter().map(|r| r.buy_hold).collect::<Vec<_>>(),
            "# Wins" => rows.iter().map(|r| r.wins as i64).collect::<Vec<_>>(),
            "# Losses" => rows.iter().map(|r| r.losses as i64).collect::<Vec<_>>(),
            "Period" => rows.iter().map(|r| r.period_length.clone()).collect::<Vec<_>>(),
            "Min Periods" => rows.iter().map(|r| r.min_periods).collect::<Vec<_>>(),
            "# Days" => rows.iter().map(|r| r.days as i64).collect::<Vec<_>>(),
            "Full Parameters" => params,
        }?;

        Ok(df)
    }

    /// Writes the leaderboard CSV and the population JSON under `dir`
    pub fn persist(&self, dir: &Path, naming: &RecordNaming) -> Result<RecordPaths> {
        fs::create_dir_all(dir).map_err(|e| DarwinError::persistence(dir, e))?;

        let stem = naming.stem(self.generation);
        let paths = RecordPaths {
            leaderboard: dir.join(format!("backtesting_{}.csv", stem)),
            populations: dir.join(format!("generation_data_{}.json", stem)),
        };

        let mut df = self.leaderboard_frame()?;
        let mut file = File::create(&paths.leaderboard)
            .map_err(|e| DarwinError::persistence(&paths.leaderboard, e))?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        log::info!("> Finished writing generation csv to {}", paths.leaderboard.display());

        fs::write(&paths.populations, self.population_json()?)
            .map_err(|e| DarwinError::persistence(&paths.populations, e))?;
        log::info!("> Finished writing generation json to {}", paths.populations.display());

        Ok(paths)
    }
}

/// Reads a population dump written by [`GenerationRecord::persist`]
pub fn load_population<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, Vec<Phenotype>>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        DarwinError::Configuration(format!(
            "Failed to read population data {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        DarwinError::Configuration(format!(
            "Malformed population data {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TraitValue, WinLossRatio};

    fn result(strategy: &str, fitness: f64, losses: u32) -> SimulationResult {
        let mut params = BTreeMap::new();
        params.insert("strategy".to_string(), serde_json::json!(strategy));
        SimulationResult {
            selector: "gdax.BTC-USD".into(),
            strategy: strategy.into(),
            end_balance: 1200.0,
            buy_hold: 1000.0,
            vs_buy_hold: 20.0,
            wins: 4,
            losses,
            error_rate: 0.0,
            period_length: Some("15m".into()),
            min_periods: None,
            markdown_buy_pct: None,
            markup_sell_pct: None,
            order_type: Some("maker".into()),
            days: 10,
            roi: 20.0,
            wl_ratio: WinLossRatio::from_counts(4, losses),
            frequency: 0.4,
            fitness,
            params,
        }
    }

    fn record() -> GenerationRecord {
        let mut traits = BTreeMap::new();
        traits.insert("rsi_periods".to_string(), TraitValue::Int(14));
        let mut populations = BTreeMap::new();
        populations.insert("rsi".to_string(), vec![Phenotype::new(traits)]);

        GenerationRecord::new(
            3,
            vec![result("rsi", 0.7, 2), result("macd", 1.4, 0)],
            populations,
        )
    }

    #[test]
    fn test_leaderboard_sorted_desc() {
        let record = record();
        assert_eq!(record.leaderboard[0].strategy, "macd");
        assert_eq!(record.leaderboard[1].strategy, "rsi");
    }

    #[test]
    fn test_persist_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let naming = RecordNaming {
            selector: "gdax.BTC-USD".into(),
            strategies_label: "all".into(),
            timestamp: 1_700_000_000,
        };

        let paths = record().persist(dir.path(), &naming).unwrap();
        assert_eq!(
            paths.leaderboard.file_name().unwrap(),
            "backtesting_gdax.BTC-USD_all_1700000000_gen_3.csv"
        );
        assert_eq!(
            paths.populations.file_name().unwrap(),
            "generation_data_gdax.BTC-USD_all_1700000000_gen_3.json"
        );

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(paths.leaderboard.clone()))
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 15);
        let strategies = df.column("Strategy").unwrap();
        assert_eq!(strategies.str().unwrap().get(0), Some("macd"));
        let ratios = df.column("Win/Loss Ratio").unwrap();
        assert_eq!(ratios.str().unwrap().get(0), Some("unbounded"));

        let populations = load_population(&paths.populations).unwrap();
        assert_eq!(populations["rsi"].len(), 1);
        assert_eq!(populations["rsi"][0].get("rsi_periods"), Some(&TraitValue::Int(14)));
    }

    #[test]
    fn test_empty_leaderboard_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let naming = RecordNaming {
            selector: "gdax.BTC-USD".into(),
            strategies_label: "rsi".into(),
            timestamp: 1,
        };
        let empty = GenerationRecord::new(1, Vec::new(), BTreeMap::new());
        let paths = empty.persist(dir.path(), &naming).unwrap();

        let text = std::fs::read_to_string(&paths.leaderboard).unwrap();
        assert!(text.starts_with("Selector,Fitness,"));
    }

    #[test]
    fn test_malformed_population_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(load_population(&path), Err(DarwinError::Configuration(_))));
    }

    #[test]
    fn test_older_dump_imports_traits_without_sim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generation_data_old.json");
        std::fs::write(
            &path,
            r#"{"trend_ema": [
                {"period_length": "30m", "trend_ema": 26, "oversold_rsi": 30,
                 "sim": {"selector": {"normalized": "gdax.BTC-USD"}, "end_balance": 1210.5,
                         "vsBuyHold": 12.1, "wlRatio": null,
                         "params": "module.exports = {\"trend_ema\": 26}"}},
                {"period_length": "1h", "trend_ema": 40, "oversold_rsi": 25}
            ]}"#,
        )
        .unwrap();

        let populations = load_population(&path).unwrap();
        let members = &populations["trend_ema"];
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].get("trend_ema"), Some(&TraitValue::Int(26)));
        assert_eq!(members[0].get("period_length"), Some(&TraitValue::Text("30m".into())));
        assert!(members.iter().all(|p| p.sim.is_none()));
    }
}
