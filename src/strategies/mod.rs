pub mod catalog;
pub mod range;

pub use catalog::StrategyCatalog;
pub use range::{split_period, StrategyParameterSpec, TraitRange, ACTIVATIONS};
