use crate::config::{ExportConfig, OracleConfig};
use crate::engines::evaluation::{Dispatcher, Invocation, Oracle, ReportGrammar};
use crate::error::{DarwinError, Result};
use crate::types::SimulationResult;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONF_SUFFIX: &str = ".conf.json";
const BEST_DIR: &str = "best";

/// An exported configuration and what re-simulating it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub path: PathBuf,
    pub result: Option<SimulationResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    /// Best first; configurations whose run degraded come last
    pub ranked: Vec<Ranked>,
    /// Where the winning parameters were written, if anything ran
    pub best: Option<PathBuf>,
}

/// Re-simulates previously exported configurations under one window and
/// keeps the fittest as `best.conf.json`
pub struct ConfigComparison {
    oracle_config: OracleConfig,
    export: ExportConfig,
    dispatcher: Dispatcher,
}

impl ConfigComparison {
    pub fn new(oracle_config: OracleConfig, export: ExportConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(
            oracle_config.worker_count(),
            ReportGrammar::from_config(&oracle_config),
        )?;
        Ok(Self {
            oracle_config,
            export,
            dispatcher,
        })
    }

    /// Exported configurations under the export directory, optionally only
    /// those of one strategy. Earlier winners are not candidates.
    pub fn exported(&self, strategy: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        if self.export.export_dir.is_dir() {
            walk(&self.export.export_dir, strategy, &mut found)?;
        }
        found.sort();
        Ok(found)
    }

    pub fn run<O: Oracle + ?Sized>(&self, oracle: &O, strategy: Option<&str>) -> Result<ComparisonReport> {
        let mut paths = Vec::new();
        let mut tasks = Vec::new();
        for path in self.exported(strategy)? {
            match load_conf(&path) {
                Ok(params) => match Invocation::for_exported(&params, &self.oracle_config) {
                    Some(task) => {
                        paths.push(path);
                        tasks.push(task);
                    }
                    None => log::warn!("Skipping {}: no strategy recorded", path.display()),
                },
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        log::info!(
            "Comparing {} exported configurations from {}",
            tasks.len(),
            self.export.export_dir.display()
        );

        let results = self.dispatcher.run(oracle, &tasks);
        let mut ranked: Vec<Ranked> = paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| Ranked { path, result })
            .collect();
        ranked.sort_by(|a, b| fitness_of(b).total_cmp(&fitness_of(a)));

        let Some(winner) = ranked.first().and_then(|r| r.result.as_ref()) else {
            log::warn!("No exported configuration simulated successfully");
            return Ok(ComparisonReport { ranked, best: None });
        };

        let mut dir = self.export.export_dir.join(&winner.selector).join(BEST_DIR);
        if let Some(strategy) = strategy {
            dir.push(strategy);
        }
        fs::create_dir_all(&dir).map_err(|e| DarwinError::persistence(&dir, e))?;
        let target = dir.join(format!("{}{}", BEST_DIR, CONF_SUFFIX));
        fs::write(&target, serde_json::to_string_pretty(&winner.params)?)
            .map_err(|e| DarwinError::persistence(&target, e))?;

        log::info!(
            "Best exported configuration: {} (fitness {}, roi {}%) written to {}",
            winner.strategy,
            winner.fitness,
            winner.roi,
            target.display()
        );
        Ok(ComparisonReport {
            ranked,
            best: Some(target),
        })
    }
}

fn fitness_of(ranked: &Ranked) -> f64 {
    ranked
        .result
        .as_ref()
        .map(|r| r.fitness)
        .unwrap_or(f64::NEG_INFINITY)
}

fn walk(dir: &Path, strategy: Option<&str>, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| DarwinError::persistence(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| DarwinError::persistence(dir, e))?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name != BEST_DIR) {
                walk(&path, strategy, found)?;
            }
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(CONF_SUFFIX) else {
            continue;
        };
        if strategy.map_or(true, |s| s == stem) {
            found.push(path);
        }
    }
    Ok(())
}

/// Accepts both the plain JSON this crate exports and the older
/// `module.exports = {...}` form
fn load_conf(path: &Path) -> Result<BTreeMap<String, Value>> {
    let contents = fs::read_to_string(path).map_err(|e| DarwinError::persistence(path, e))?;
    let body = contents.trim_start();
    let body = body.strip_prefix("module.exports =").unwrap_or(body);
    Ok(serde_json::from_str(body)?)
}
