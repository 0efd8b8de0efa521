use super::oracle::{Invocation, Oracle};
use super::parser::ReportGrammar;
use crate::engines::generation::operators::score;
use crate::error::{DarwinError, Result};
use crate::types::SimulationResult;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs a batch of simulations with at most `workers` in flight
pub struct Dispatcher {
    pool: rayon::ThreadPool,
    grammar: ReportGrammar,
}

impl Dispatcher {
    pub fn new(workers: usize, grammar: ReportGrammar) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("darwin-sim-{}", i))
            .build()
            .map_err(|e| DarwinError::Dispatch(format!("Failed to build worker pool: {}", e)))?;

        Ok(Self { pool, grammar })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// One result slot per task, in task order. Failed trials come back as `None`.
    pub fn run<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        tasks: &[Invocation],
    ) -> Vec<Option<SimulationResult>> {
        let total = tasks.len();
        let started = AtomicUsize::new(0);

        self.pool.install(|| {
            tasks
                .par_iter()
                .with_max_len(1)
                .map(|task| {
                    let index = started.fetch_add(1, Ordering::SeqCst) + 1;
                    log::info!("[ {}/{} ] {}", index, total, oracle.command_line(task));
                    self.evaluate(oracle, task)
                })
                .collect()
        })
    }

    fn evaluate<O: Oracle + ?Sized>(&self, oracle: &O, task: &Invocation) -> Option<SimulationResult> {
        let outcome = oracle
            .simulate(task)
            .and_then(|stdout| self.grammar.parse(&stdout));

        match outcome {
            Ok(mut result) => {
                if result.strategy.is_empty() {
                    result.strategy = task.strategy.clone();
                }
                if result.selector.is_empty() {
                    result.selector = task.selector.clone();
                }
                result.fitness = score(&result);
                Some(result)
            }
            Err(DarwinError::OracleInvocation {
                command,
                reason,
                stderr,
            }) => {
                log::warn!("Simulation failed ({}): {}", reason, command);
                if !stderr.trim().is_empty() {
                    log::warn!("{}", stderr.trim_end());
                }
                None
            }
            Err(DarwinError::ReportParse { reason, raw }) => {
                log::warn!("Bad output detected for {}: {}", task.strategy, reason);
                log::debug!("{}", raw);
                None
            }
            Err(e) => {
                log::warn!("Simulation for {} degraded: {}", task.strategy, e);
                None
            }
        }
    }
}
