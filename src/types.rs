use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Concrete value of one trait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String), // maker/taker, activations, period lengths like "15m"
}

impl TraitValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraitValue::Int(v) => Some(*v as f64),
            TraitValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraitValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TraitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitValue::Bool(v) => write!(f, "{}", v),
            TraitValue::Int(v) => write!(f, "{}", v),
            TraitValue::Float(v) => write!(f, "{}", v),
            TraitValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// One parameter assignment under evaluation.
///
/// Serializes as a flat trait object with an optional `sim` entry, the same
/// shape the generation dumps use, so dumps can be imported back as a
/// starting population. A `sim` entry this crate cannot read (older dump
/// formats carry the parameters as a source string) is dropped on import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phenotype {
    #[serde(flatten)]
    pub traits: BTreeMap<String, TraitValue>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "readable_sim"
    )]
    pub sim: Option<SimulationResult>,
}

fn readable_sim<'de, D>(deserializer: D) -> Result<Option<SimulationResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value(raw) {
        Ok(sim) => Ok(Some(sim)),
        Err(e) => {
            log::debug!("Dropping unreadable sim entry: {}", e);
            Ok(None)
        }
    }
}

impl Phenotype {
    pub fn new(traits: BTreeMap<String, TraitValue>) -> Self {
        Self { traits, sim: None }
    }

    pub fn get(&self, name: &str) -> Option<&TraitValue> {
        self.traits.get(name)
    }
}

/// Win/loss ratio, with an explicit marker for "wins and no losses"
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RatioRepr", into = "RatioRepr")]
pub enum WinLossRatio {
    Ratio(f64),
    Unbounded,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RatioRepr {
    Number(f64),
    Text(String),
}

impl From<WinLossRatio> for RatioRepr {
    fn from(ratio: WinLossRatio) -> Self {
        match ratio {
            WinLossRatio::Ratio(v) => RatioRepr::Number(v),
            WinLossRatio::Unbounded => RatioRepr::Text(UNBOUNDED.to_string()),
        }
    }
}

impl TryFrom<RatioRepr> for WinLossRatio {
    type Error = String;

    fn try_from(repr: RatioRepr) -> Result<Self, Self::Error> {
        match repr {
            RatioRepr::Number(v) => Ok(WinLossRatio::Ratio(v)),
            RatioRepr::Text(s) if s == UNBOUNDED => Ok(WinLossRatio::Unbounded),
            RatioRepr::Text(s) => Err(format!("invalid win/loss ratio: {}", s)),
        }
    }
}

const UNBOUNDED: &str = "unbounded";

impl WinLossRatio {
    /// wins/losses rounded to 3 decimals. No trades at all is a ratio of 0.
    pub fn from_counts(wins: u32, losses: u32) -> Self {
        if losses > 0 {
            WinLossRatio::Ratio(round3(wins as f64 / losses as f64))
        } else if wins > 0 {
            WinLossRatio::Unbounded
        } else {
            WinLossRatio::Ratio(0.0)
        }
    }

    pub fn exceeds(&self, threshold: f64) -> bool {
        match self {
            WinLossRatio::Ratio(v) => *v > threshold,
            WinLossRatio::Unbounded => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WinLossRatio::Ratio(v) => Some(*v),
            WinLossRatio::Unbounded => None,
        }
    }
}

impl fmt::Display for WinLossRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WinLossRatio::Ratio(v) => write!(f, "{}", v),
            WinLossRatio::Unbounded => f.write_str(UNBOUNDED),
        }
    }
}

/// Structured summary of one oracle run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub selector: String,
    pub strategy: String,
    pub end_balance: f64,
    pub buy_hold: f64,
    pub vs_buy_hold: f64,
    pub wins: u32,
    pub losses: u32,
    pub error_rate: f64,
    pub period_length: Option<String>,
    pub min_periods: Option<i64>,
    pub markdown_buy_pct: Option<f64>,
    pub markup_sell_pct: Option<f64>,
    pub order_type: Option<String>,
    pub days: u32,
    pub roi: f64,
    pub wl_ratio: WinLossRatio,
    pub frequency: f64,
    #[serde(default)]
    pub fitness: f64,
    /// Canonical parameter snapshot, loadable as oracle input
    pub params: BTreeMap<String, serde_json::Value>,
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
