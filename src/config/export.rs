use super::traits::ConfigSection;
use crate::error::DarwinError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where results land, and what a result must clear to be exported
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub min_roi: f64,
    pub min_vs_buy_hold: f64,
    pub min_win_loss_ratio: f64,
    /// Root of exported `<selector>/<days>/<strategy>.conf.json` artifacts
    pub export_dir: PathBuf,
    /// Per-generation leaderboards and population dumps
    pub simulations_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            min_roi: 5.0,
            min_vs_buy_hold: 2.0,
            min_win_loss_ratio: 0.3,
            export_dir: PathBuf::from("strategies"),
            simulations_dir: PathBuf::from("simulations"),
        }
    }
}

impl ConfigSection for ExportConfig {
    fn section_name() -> &'static str {
        "export"
    }

    fn validate(&self) -> Result<(), DarwinError> {
        if self.min_win_loss_ratio < 0.0 {
            return Err(DarwinError::Configuration(
                "Minimum win/loss ratio must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
