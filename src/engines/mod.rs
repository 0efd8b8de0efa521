pub mod compare;
pub mod evaluation;
pub mod export;
pub mod generation;
