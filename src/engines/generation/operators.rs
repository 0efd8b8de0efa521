use crate::config::OperatorConfig;
use crate::strategies::{split_period, StrategyParameterSpec, TraitRange, ACTIVATIONS};
use crate::types::{Phenotype, SimulationResult, TraitValue};
use rand::Rng;
use std::collections::BTreeMap;

/// Which generator supplies candidate alleles during mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Random,
    Similar,
}

/// Random phenotype: every trait sampled independently from its range
pub fn create<R: Rng + ?Sized>(spec: &StrategyParameterSpec, rng: &mut R) -> Phenotype {
    let traits = spec
        .iter()
        .map(|(name, range)| (name.clone(), sample(range, rng)))
        .collect();
    Phenotype::new(traits)
}

/// Draws one value from a trait range
pub fn sample<R: Rng + ?Sized>(range: &TraitRange, rng: &mut R) -> TraitValue {
    match range {
        TraitRange::Int { min, max } => TraitValue::Int(rng.gen_range(*min..=*max)),
        TraitRange::IntOrZero { min, max } => {
            if rng.gen_bool(0.5) {
                TraitValue::Int(rng.gen_range(*min..=*max))
            } else {
                TraitValue::Int(0)
            }
        }
        TraitRange::IntFactor { min, max, factor } => {
            if *min == 0 && rng.gen_bool(0.5) {
                return TraitValue::Int(0);
            }
            TraitValue::Int(snap_to_factor(rng.gen_range(*min..=*max), *min, *max, *factor))
        }
        TraitRange::Float { min, max } => {
            if max > min {
                TraitValue::Float(rng.gen_range(*min..*max))
            } else {
                TraitValue::Float(*min)
            }
        }
        TraitRange::MakerTaker => TraitValue::Text(maker_or_taker(rng).to_string()),
        TraitRange::Maker => TraitValue::Text("maker".to_string()),
        TraitRange::Taker => TraitValue::Text("taker".to_string()),
        TraitRange::Activation => {
            TraitValue::Text(ACTIVATIONS[rng.gen_range(0..ACTIVATIONS.len())].to_string())
        }
        TraitRange::PeriodLength { min, max, unit } => {
            TraitValue::Text(format!("{}{}", rng.gen_range(*min..=*max), unit))
        }
        TraitRange::Bool => TraitValue::Bool(rng.gen_bool(0.5)),
    }
}

fn maker_or_taker<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    if rng.gen_bool(0.5) {
        "maker"
    } else {
        "taker"
    }
}

/// Nearest multiple of `factor` among those inside `[min, max]`.
/// Ranges without such a multiple are rejected by `TraitRange::validate`.
fn snap_to_factor(value: i64, min: i64, max: i64, factor: i64) -> i64 {
    if factor <= 1 {
        return value.clamp(min, max);
    }
    let lowest = min.div_euclid(factor) * factor + if min.rem_euclid(factor) == 0 { 0 } else { factor };
    let highest = max.div_euclid(factor) * factor;
    if lowest > highest {
        return value.clamp(min, max);
    }
    let nearest = ((value as f64 / factor as f64).round() as i64) * factor;
    nearest.clamp(lowest, highest)
}

/// Phenotype near `phenotype`: every numeric trait moves by `percentage`
/// percent of its value, up or down, and is clamped back into its range.
/// Maker/taker and activation traits are redrawn. A zero sentinel on a
/// zero-capable range stays zero.
pub fn create_similar<R: Rng + ?Sized>(
    spec: &StrategyParameterSpec,
    phenotype: &Phenotype,
    percentage: f64,
    rng: &mut R,
) -> Phenotype {
    let mut traits = BTreeMap::new();

    for (name, range) in spec.iter() {
        let value = match phenotype.get(name) {
            Some(current) => similar_value(range, current, percentage, rng),
            None => sample(range, rng),
        };
        traits.insert(name.clone(), value);
    }

    Phenotype::new(traits)
}

fn similar_value<R: Rng + ?Sized>(
    range: &TraitRange,
    current: &TraitValue,
    percentage: f64,
    rng: &mut R,
) -> TraitValue {
    let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let shift = |v: f64| direction * v * percentage / 100.0;

    match (range, current) {
        (TraitRange::Int { min, max }, TraitValue::Int(v)) => {
            TraitValue::Int((v + shift(*v as f64) as i64).clamp(*min, *max))
        }
        (TraitRange::IntOrZero { min, max }, TraitValue::Int(v)) => {
            if *v == 0 {
                TraitValue::Int(0)
            } else {
                TraitValue::Int((v + shift(*v as f64) as i64).clamp(*min, *max))
            }
        }
        (TraitRange::IntFactor { min, max, factor }, TraitValue::Int(v)) => {
            if *v == 0 && *min == 0 {
                TraitValue::Int(0)
            } else {
                let moved = (v + shift(*v as f64) as i64).clamp(*min, *max);
                TraitValue::Int(snap_to_factor(moved, *min, *max, *factor))
            }
        }
        (TraitRange::Float { min, max }, v) => match v.as_f64() {
            Some(x) => TraitValue::Float((x + shift(x)).clamp(*min, *max)),
            None => sample(range, rng),
        },
        (TraitRange::PeriodLength { min, max, unit }, TraitValue::Text(s)) => {
            match split_period(s) {
                Some((n, _)) => {
                    let moved = (n + shift(n as f64) as i64).clamp(*min, *max);
                    TraitValue::Text(format!("{}{}", moved, unit))
                }
                None => sample(range, rng),
            }
        }
        (TraitRange::MakerTaker, _) | (TraitRange::Activation, _) => sample(range, rng),
        (TraitRange::Maker, _) | (TraitRange::Taker, _) => sample(range, rng),
        (TraitRange::Bool, TraitValue::Bool(b)) => TraitValue::Bool(*b),
        // Value does not fit its range kind
        _ => sample(range, rng),
    }
}

/// Mutation picks the similarity generator only for parents that are
/// already fit enough
pub fn candidate_source(old: &Phenotype, config: &OperatorConfig) -> CandidateSource {
    if fitness(old) > config.similar_fitness_threshold {
        CandidateSource::Similar
    } else {
        CandidateSource::Random
    }
}

/// Each trait keeps its old allele or takes the candidate's
pub fn mutation<R: Rng + ?Sized>(
    old: &Phenotype,
    spec: &StrategyParameterSpec,
    config: &OperatorConfig,
    rng: &mut R,
) -> Phenotype {
    let (candidate, chance) = match candidate_source(old, config) {
        CandidateSource::Random => (create(spec, rng), config.mutation_chance),
        CandidateSource::Similar => (
            create_similar(spec, old, config.similarity_percentage, rng),
            config.mutation_chance * config.similar_mutation_boost,
        ),
    };
    let chance = chance.clamp(0.0, 1.0);

    let traits = candidate
        .traits
        .into_iter()
        .map(|(name, fresh)| {
            let value = match old.get(&name) {
                Some(kept) if !rng.gen_bool(chance) => kept.clone(),
                _ => fresh,
            };
            (name, value)
        })
        .collect();

    Phenotype::new(traits)
}

/// Uniform per-trait recombination into two children
pub fn crossover<R: Rng + ?Sized>(
    a: &Phenotype,
    b: &Phenotype,
    spec: &StrategyParameterSpec,
    config: &OperatorConfig,
    rng: &mut R,
) -> (Phenotype, Phenotype) {
    let chance = config.crossover_chance.clamp(0.0, 1.0);
    let mut first = BTreeMap::new();
    let mut second = BTreeMap::new();

    for (name, range) in spec.iter() {
        let pick = |rng: &mut R| {
            let from_b = rng.gen_bool(chance);
            let chosen = if from_b { b.get(name) } else { a.get(name) };
            chosen
                .or_else(|| a.get(name))
                .or_else(|| b.get(name))
                .cloned()
                .unwrap_or_else(|| sample(range, rng))
        };
        first.insert(name.clone(), pick(&mut *rng));
        second.insert(name.clone(), pick(&mut *rng));
    }

    (Phenotype::new(first), Phenotype::new(second))
}

/// Excess return, scaled by a logistic of net wins and by trade frequency
pub fn score(result: &SimulationResult) -> f64 {
    let vs_buy_hold_rate = result.vs_buy_hold / 50.0;
    let net = result.wins as f64 - result.losses as f64;
    let win_loss_rate = 1.0 / (1.0 + (-net).exp());
    vs_buy_hold_rate * win_loss_rate * result.frequency
}

pub fn fitness(phenotype: &Phenotype) -> f64 {
    phenotype.sim.as_ref().map(score).unwrap_or(0.0)
}

/// Whether `a` beats (or ties) `b`
pub fn competition(a: &Phenotype, b: &Phenotype) -> bool {
    fitness(a) >= fitness(b)
}
