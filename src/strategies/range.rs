use crate::types::{Phenotype, TraitValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ACTIVATIONS: [&str; 3] = ["sigmoid", "tanh", "relu"];

/// Valid-range descriptor for one trait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraitRange {
    Int { min: i64, max: i64 },
    /// Half the draws are a literal zero
    IntOrZero { min: i64, max: i64 },
    /// Multiples of `factor`; half the draws are zero when `min == 0`
    IntFactor { min: i64, max: i64, factor: i64 },
    /// Half-open `[min, max)`
    Float { min: f64, max: f64 },
    MakerTaker,
    Maker,
    Taker,
    Activation,
    /// Integer with a fixed unit suffix, e.g. `15m`
    PeriodLength { min: i64, max: i64, unit: String },
    Bool,
}

impl TraitRange {
    pub fn int(min: i64, max: i64) -> Self {
        TraitRange::Int { min, max }
    }

    pub fn int_or_zero(min: i64, max: i64) -> Self {
        TraitRange::IntOrZero { min, max }
    }

    pub fn int_factor(min: i64, max: i64, factor: i64) -> Self {
        TraitRange::IntFactor { min, max, factor }
    }

    pub fn float(min: f64, max: f64) -> Self {
        TraitRange::Float { min, max }
    }

    pub fn period(min: i64, max: i64, unit: &str) -> Self {
        TraitRange::PeriodLength {
            min,
            max,
            unit: unit.to_string(),
        }
    }

    /// Rejects ranges no value can be drawn from
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TraitRange::Int { min, max }
            | TraitRange::IntOrZero { min, max }
            | TraitRange::PeriodLength { min, max, .. }
                if min > max =>
            {
                Err(format!("empty range [{}, {}]", min, max))
            }
            TraitRange::IntFactor { min, max, factor } => {
                if *factor < 1 {
                    return Err(format!("factor {} must be positive", factor));
                }
                let first = min.div_euclid(*factor) * factor
                    + if min.rem_euclid(*factor) == 0 { 0 } else { *factor };
                if min > max || first > *max {
                    return Err(format!("no multiple of {} in [{}, {}]", factor, min, max));
                }
                Ok(())
            }
            TraitRange::Float { min, max } if min > max => {
                Err(format!("empty range [{}, {}]", min, max))
            }
            _ => Ok(()),
        }
    }

    /// Numeric bounds, for kinds that have them
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            TraitRange::Int { min, max }
            | TraitRange::IntOrZero { min, max }
            | TraitRange::IntFactor { min, max, .. }
            | TraitRange::PeriodLength { min, max, .. } => Some((*min as f64, *max as f64)),
            TraitRange::Float { min, max } => Some((*min, *max)),
            _ => None,
        }
    }

    /// Whether `value` is a legal assignment for this trait
    pub fn admits(&self, value: &TraitValue) -> bool {
        match (self, value) {
            (TraitRange::Int { min, max }, TraitValue::Int(v)) => (*min..=*max).contains(v),
            (TraitRange::IntOrZero { min, max }, TraitValue::Int(v))
            | (TraitRange::IntFactor { min, max, .. }, TraitValue::Int(v)) => {
                *v == 0 || (*min..=*max).contains(v)
            }
            (TraitRange::Float { min, max }, v) => v
                .as_f64()
                .map(|x| x >= *min && x <= *max)
                .unwrap_or(false),
            (TraitRange::MakerTaker, TraitValue::Text(s)) => s == "maker" || s == "taker",
            (TraitRange::Maker, TraitValue::Text(s)) => s == "maker",
            (TraitRange::Taker, TraitValue::Text(s)) => s == "taker",
            (TraitRange::Activation, TraitValue::Text(s)) => ACTIVATIONS.contains(&s.as_str()),
            (TraitRange::PeriodLength { min, max, unit }, TraitValue::Text(s)) => {
                split_period(s)
                    .map(|(n, u)| u == unit && (*min..=*max).contains(&n))
                    .unwrap_or(false)
            }
            (TraitRange::Bool, TraitValue::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Splits `"15m"` into `(15, "m")`
pub fn split_period(value: &str) -> Option<(i64, &str)> {
    let digits = value
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    let number = value[..digits].parse().ok()?;
    Some((number, &value[digits..]))
}

/// Per-strategy mapping of trait name to its valid range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameterSpec {
    traits: BTreeMap<String, TraitRange>,
}

impl StrategyParameterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, range: TraitRange) -> Self {
        self.traits.insert(name.to_string(), range);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TraitRange> {
        self.traits.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TraitRange)> {
        self.traits.iter()
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Validates every range, naming the first unusable trait
    pub fn validate(&self) -> Result<(), String> {
        for (name, range) in &self.traits {
            range.validate().map_err(|reason| format!("trait '{}': {}", name, reason))?;
        }
        Ok(())
    }

    /// Checks that `phenotype` has exactly this spec's traits, each in range.
    /// Returns a description of the first violation.
    pub fn check(&self, phenotype: &Phenotype) -> Result<(), String> {
        for name in phenotype.traits.keys() {
            if !self.traits.contains_key(name) {
                return Err(format!("unexpected trait '{}'", name));
            }
        }
        for (name, range) in &self.traits {
            match phenotype.traits.get(name) {
                None => return Err(format!("missing trait '{}'", name)),
                Some(value) if !range.admits(value) => {
                    return Err(format!("trait '{}' out of range: {}", name, value))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
