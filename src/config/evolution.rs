use super::traits::{check_probability, ConfigSection};
use crate::error::DarwinError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// Stop after this many generations; `None` runs until interrupted
    pub max_generations: Option<usize>,
    pub fitness_cutoff: f64,
    pub roi_cutoff: f64,
    pub elitism_count: usize,
    pub tournament_size: usize,
    /// Chance an offspring comes from crossover rather than mutation
    pub crossover_rate: f64,
    pub seed: Option<u64>,
    pub operators: OperatorConfig,
}

/// Constants of the phenotype operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub mutation_chance: f64,
    pub crossover_chance: f64,
    /// Percentage a numeric trait moves under similar mutation
    pub similarity_percentage: f64,
    /// Factor applied to `mutation_chance` under similar mutation
    pub similar_mutation_boost: f64,
    /// Fitness above which mutation searches near the parent
    pub similar_fitness_threshold: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            max_generations: None,
            fitness_cutoff: 0.5,
            roi_cutoff: 5.0,
            elitism_count: 1,
            tournament_size: 2,
            crossover_rate: 0.5,
            seed: None,
            operators: OperatorConfig::default(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            mutation_chance: 0.30,
            crossover_chance: 0.50,
            similarity_percentage: 15.0,
            similar_mutation_boost: 1.8,
            similar_fitness_threshold: 1.0,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), DarwinError> {
        if self.population_size < 2 {
            return Err(DarwinError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.elitism_count >= self.population_size {
            return Err(DarwinError::Configuration(
                "Elitism count must be smaller than the population".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(DarwinError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        let operators = format!("{}.operators", Self::section_name());
        check_probability(Self::section_name(), "crossover_rate", self.crossover_rate)?;
        check_probability(&operators, "mutation_chance", self.operators.mutation_chance)?;
        check_probability(&operators, "crossover_chance", self.operators.crossover_chance)?;
        if self.operators.similarity_percentage < 0.0 || self.operators.similar_mutation_boost < 0.0 {
            return Err(DarwinError::Configuration(
                "Similarity percentage and boost must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
