use crate::config::{EvolutionConfig, OperatorConfig};
use crate::engines::generation::operators::{competition, create, crossover, fitness, mutation};
use crate::error::{DarwinError, Result};
use crate::strategies::StrategyParameterSpec;
use crate::types::{Phenotype, SimulationResult};
use rand::Rng;

/// Minimum a result must clear to stay in the population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViabilityCutoffs {
    pub fitness: f64,
    pub roi: f64,
}

impl ViabilityCutoffs {
    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self {
            fitness: config.fitness_cutoff,
            roi: config.roi_cutoff,
        }
    }
}

impl Default for ViabilityCutoffs {
    fn default() -> Self {
        Self {
            fitness: 0.5,
            roi: 5.0,
        }
    }
}

/// Eliminates no-win, no-trade, low-fitness and low-roi results
pub fn meets_minimum_viability(result: &SimulationResult, cutoffs: &ViabilityCutoffs) -> bool {
    result.fitness > cutoffs.fitness
        && result.roi > cutoffs.roi
        && result.wins > 0
        && result.frequency > 0.0
}

fn is_viable(phenotype: &Phenotype, cutoffs: &ViabilityCutoffs) -> bool {
    phenotype
        .sim
        .as_ref()
        .map(|r| meets_minimum_viability(r, cutoffs))
        .unwrap_or(false)
}

/// Selection parameters of the generational step
#[derive(Debug, Clone, Copy)]
pub struct SelectionConfig {
    pub elitism_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
}

impl SelectionConfig {
    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self {
            elitism_count: config.elitism_count,
            tournament_size: config.tournament_size.max(1),
            crossover_rate: config.crossover_rate.clamp(0.0, 1.0),
        }
    }
}

/// One strategy's population together with the operators bound to its spec
#[derive(Debug, Clone)]
pub struct StrategyState {
    name: String,
    spec: StrategyParameterSpec,
    operators: OperatorConfig,
    target_size: usize,
    population: Vec<Phenotype>,
    best: Option<Phenotype>,
}

impl StrategyState {
    /// Keeps conforming imported members and fills the rest randomly
    pub fn seed<R: Rng + ?Sized>(
        name: &str,
        spec: StrategyParameterSpec,
        operators: OperatorConfig,
        target_size: usize,
        imported: Vec<Phenotype>,
        rng: &mut R,
    ) -> Result<Self> {
        spec.validate().map_err(|reason| {
            DarwinError::Configuration(format!("Unusable {} parameter spec: {}", name, reason))
        })?;
        for (i, phenotype) in imported.iter().enumerate() {
            spec.check(phenotype).map_err(|reason| {
                DarwinError::Configuration(format!(
                    "Imported {} phenotype #{} does not match its spec: {}",
                    name, i, reason
                ))
            })?;
        }

        let mut population = imported;
        if population.len() > target_size {
            log::warn!(
                "Imported {} population has {} members, keeping the first {}",
                name,
                population.len(),
                target_size
            );
            population.truncate(target_size);
        }
        let imported_count = population.len();
        while population.len() < target_size {
            population.push(create(&spec, rng));
        }
        log::debug!(
            "Seeded {} with {} imported and {} random phenotypes",
            name,
            imported_count,
            target_size - imported_count
        );

        let mut state = Self {
            name: name.to_string(),
            spec,
            operators,
            target_size,
            population,
            best: None,
        };
        state.refresh_best();
        Ok(state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &StrategyParameterSpec {
        &self.spec
    }

    pub fn population(&self) -> &[Phenotype] {
        &self.population
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Best phenotype seen so far, with its result
    pub fn best(&self) -> Option<&Phenotype> {
        self.best.as_ref()
    }

    pub fn mutate<R: Rng + ?Sized>(&self, phenotype: &Phenotype, rng: &mut R) -> Phenotype {
        mutation(phenotype, &self.spec, &self.operators, rng)
    }

    pub fn cross<R: Rng + ?Sized>(
        &self,
        a: &Phenotype,
        b: &Phenotype,
        rng: &mut R,
    ) -> (Phenotype, Phenotype) {
        crossover(a, b, &self.spec, &self.operators, rng)
    }

    /// Attaches one batch result per member, in population order.
    /// `None` marks a degraded trial and clears any stale result.
    pub fn apply_results(&mut self, results: Vec<Option<SimulationResult>>) {
        debug_assert_eq!(results.len(), self.population.len());
        for (phenotype, result) in self.population.iter_mut().zip(results) {
            phenotype.sim = result;
        }
        self.refresh_best();
    }

    fn refresh_best(&mut self) {
        let champion = self
            .population
            .iter()
            .filter(|p| p.sim.is_some())
            .fold(None::<&Phenotype>, |best, p| match best {
                Some(b) if competition(b, p) => Some(b),
                _ => Some(p),
            });

        if let Some(champion) = champion {
            let replace = match &self.best {
                Some(best) => fitness(champion) >= fitness(best),
                None => true,
            };
            if replace {
                self.best = Some(champion.clone());
            }
        }
    }

    /// Removes members whose result does not clear the cutoffs, degraded
    /// ones included. Returns how many died.
    pub fn cull(&mut self, cutoffs: &ViabilityCutoffs) -> usize {
        let before = self.population.len();
        self.population.retain(|p| is_viable(p, cutoffs));
        before - self.population.len()
    }

    /// Adds `count` fresh random phenotypes
    pub fn replenish<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        for _ in 0..count {
            self.population.push(create(&self.spec, rng));
        }
    }

    /// Members that currently carry a viable result
    pub fn survivors(&self, cutoffs: &ViabilityCutoffs) -> Vec<Phenotype> {
        self.population
            .iter()
            .filter(|p| is_viable(p, cutoffs))
            .cloned()
            .collect()
    }

    /// Replaces the population with the next generation: elites carried
    /// over unchanged, the rest bred from tournament winners.
    pub fn evolve<R: Rng + ?Sized>(&mut self, selection: &SelectionConfig, rng: &mut R) {
        if self.population.is_empty() {
            self.replenish(self.target_size, rng);
            return;
        }

        let mut ranked: Vec<&Phenotype> = self.population.iter().collect();
        ranked.sort_by(|a, b| {
            fitness(b)
                .partial_cmp(&fitness(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut next_generation: Vec<Phenotype> = ranked
            .iter()
            .take(selection.elitism_count.min(self.target_size))
            .map(|p| (*p).clone())
            .collect();

        while next_generation.len() < self.target_size {
            if rng.gen::<f64>() < selection.crossover_rate {
                let parent1 = tournament_selection(&self.population, selection.tournament_size, rng);
                let parent2 = tournament_selection(&self.population, selection.tournament_size, rng);
                let (child1, child2) = self.cross(parent1, parent2, rng);

                next_generation.push(child1);
                if next_generation.len() < self.target_size {
                    next_generation.push(child2);
                }
            } else {
                let parent = tournament_selection(&self.population, selection.tournament_size, rng);
                next_generation.push(self.mutate(parent, rng));
            }
        }

        next_generation.truncate(self.target_size);
        self.population = next_generation;
    }
}

/// Tournament selection: pick the `competition` winner of K random candidates
pub fn tournament_selection<'a, R: Rng + ?Sized>(
    population: &'a [Phenotype],
    tournament_size: usize,
    rng: &mut R,
) -> &'a Phenotype {
    let mut best = &population[rng.gen_range(0..population.len())];

    for _ in 1..tournament_size {
        let challenger = &population[rng.gen_range(0..population.len())];
        if !competition(best, challenger) {
            best = challenger;
        }
    }

    best
}
