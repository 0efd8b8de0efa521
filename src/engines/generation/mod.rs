pub mod evolution_engine;
pub mod operators;
pub mod population;
pub mod progress;

pub use evolution_engine::{EvolutionEngine, GenerationSummary, ProgressCallback};
pub use population::{meets_minimum_viability, StrategyState, ViabilityCutoffs};
pub use progress::{ChannelProgressCallback, ConsoleProgressCallback, ProgressMessage};
