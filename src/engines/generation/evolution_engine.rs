use crate::config::AppConfig;
use crate::data::generation_record::{GenerationRecord, RecordNaming, RecordPaths};
use crate::engines::evaluation::{replay_command, Dispatcher, Invocation, Oracle, ReportGrammar};
use crate::engines::export::{ExportGate, ExportOutcome};
use crate::engines::generation::population::{SelectionConfig, StrategyState, ViabilityCutoffs};
use crate::error::Result;
use crate::strategies::StrategyCatalog;
use crate::types::{Phenotype, SimulationResult};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// What one generation did, handed to the progress callback
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: usize,
    pub tasks: usize,
    pub evaluated: usize,
    pub degraded: usize,
    pub deaths: usize,
    pub leaderboard_size: usize,
    pub best_fitness: Option<f64>,
    pub exported: Vec<String>,
    pub record: RecordPaths,
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize, tasks: usize);
    fn on_generation_complete(&mut self, summary: &GenerationSummary);
}

/// Drives every selected strategy through evaluate, filter, replenish and
/// evolve, one shared simulation batch per generation
pub struct EvolutionEngine<O: Oracle> {
    config: AppConfig,
    oracle: O,
    dispatcher: Dispatcher,
    gate: ExportGate,
    strategies: Vec<StrategyState>,
    naming: RecordNaming,
    generation: usize,
    rng: StdRng,
}

impl<O: Oracle> EvolutionEngine<O> {
    /// `selection` is `all` or a comma separated list of strategy names.
    /// `imported` populations are keyed by strategy name.
    pub fn new(
        config: AppConfig,
        oracle: O,
        selection: &str,
        mut imported: BTreeMap<String, Vec<Phenotype>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let catalog = StrategyCatalog::new();
        let selected = catalog.select(selection)?;

        let mut strategies = Vec::with_capacity(selected.len());
        for name in &selected {
            let spec = catalog.get(name)?.clone();
            let members = imported.remove(name).unwrap_or_default();
            strategies.push(StrategyState::seed(
                name,
                spec,
                config.evolution.operators.clone(),
                config.evolution.population_size,
                members,
                &mut rng,
            )?);
        }
        for name in imported.keys() {
            log::warn!("Ignoring imported population for unselected strategy {}", name);
        }

        let dispatcher = Dispatcher::new(
            config.oracle.worker_count(),
            ReportGrammar::from_config(&config.oracle),
        )?;
        log::info!(
            "Evolving {} with {} phenotypes each, {} simulations in parallel",
            selected.join(","),
            config.evolution.population_size,
            dispatcher.workers()
        );

        let naming = RecordNaming {
            selector: config.oracle.selector.clone(),
            strategies_label: selection.to_string(),
            timestamp: Utc::now().timestamp(),
        };

        Ok(Self {
            gate: ExportGate::new(config.export.clone()),
            config,
            oracle,
            dispatcher,
            strategies,
            naming,
            generation: 0,
            rng,
        })
    }

    pub fn strategies(&self) -> &[StrategyState] {
        &self.strategies
    }

    /// Generations completed so far
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Runs until the configured generation limit; forever without one
    pub fn run<C: ProgressCallback>(&mut self, mut callback: C) -> Result<usize> {
        loop {
            if let Some(limit) = self.config.evolution.max_generations {
                if self.generation >= limit {
                    break;
                }
            }
            self.step(&mut callback)?;
        }
        Ok(self.generation)
    }

    pub fn step<C: ProgressCallback + ?Sized>(&mut self, callback: &mut C) -> Result<GenerationSummary> {
        let generation = self.generation + 1;
        log::info!("=== Simulating generation {} ===", generation);

        if self.config.oracle.backfill {
            let days = self.config.oracle.simulation_days(Utc::now())?;
            if let Err(e) = self.oracle.backfill(&self.config.oracle.selector, days) {
                log::warn!("Backfill failed, simulating on existing data: {}", e);
            }
        }

        let mut tasks = Vec::new();
        for state in &self.strategies {
            for phenotype in state.population() {
                tasks.push(Invocation::for_phenotype(state.name(), phenotype, &self.config.oracle));
            }
        }
        callback.on_generation_start(generation, tasks.len());

        let results = self.dispatcher.run(&self.oracle, &tasks);
        let degraded = results.iter().filter(|r| r.is_none()).count();
        let mut results = results.into_iter();
        log::info!("Generation complete, saving results...");

        let cutoffs = ViabilityCutoffs::from_config(&self.config.evolution);
        let selection = SelectionConfig::from_config(&self.config.evolution);
        let mut leaderboard: Vec<SimulationResult> = Vec::new();
        let mut deaths = 0;

        for state in &mut self.strategies {
            let batch: Vec<Option<SimulationResult>> =
                results.by_ref().take(state.population().len()).collect();
            state.apply_results(batch);

            leaderboard.extend(state.survivors(&cutoffs).into_iter().filter_map(|p| p.sim));

            let died = state.cull(&cutoffs);
            log::debug!("{}: {} phenotypes did not meet minimum viability", state.name(), died);
            state.replenish(died, &mut self.rng);
            deaths += died;

            state.evolve(&selection, &mut self.rng);
        }

        let populations = self
            .strategies
            .iter()
            .map(|s| (s.name().to_string(), s.population().to_vec()))
            .collect();
        let record = GenerationRecord::new(generation, leaderboard, populations);
        let dataset = record.population_json()?;

        log::info!("Generation's best results");
        let mut exported = Vec::new();
        for state in &self.strategies {
            let Some(best) = state.best() else {
                log::info!("\t({}) no successful simulation yet", state.name());
                continue;
            };
            let Some(sim) = best.sim.as_ref() else {
                continue;
            };
            log::info!(
                "\t({}) Sim Fitness {}, VS Buy and Hold: {} End Balance: {}, Wins/Losses {}/{}.",
                state.name(),
                sim.fitness,
                sim.vs_buy_hold,
                sim.end_balance,
                sim.wins,
                sim.losses
            );
            if sim.fitness <= 0.0 {
                log::info!("\t({}) no profitable result yet, nothing to export", state.name());
                continue;
            }
            if let ExportOutcome::Written(_) = self.gate.offer(best, &dataset)? {
                exported.push(state.name().to_string());
            }
        }

        let paths = record.persist(&self.config.export.simulations_dir, &self.naming)?;

        if let Some(top) = record.leaderboard.first() {
            log::info!(
                "{}",
                replay_command(
                    &self.config.oracle.command,
                    &top.params,
                    self.config.oracle.asset_capital,
                    self.config.oracle.currency_capital,
                )
            );
        }

        let summary = GenerationSummary {
            generation,
            tasks: tasks.len(),
            evaluated: tasks.len() - degraded,
            degraded,
            deaths,
            leaderboard_size: record.leaderboard.len(),
            best_fitness: record.leaderboard.first().map(|r| r.fitness),
            exported,
            record: paths,
        };
        callback.on_generation_complete(&summary);

        self.generation = generation;
        Ok(summary)
    }
}
