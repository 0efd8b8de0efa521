pub mod generation_record;

pub use generation_record::{load_population, GenerationRecord, RecordNaming, RecordPaths};
