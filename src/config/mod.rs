pub mod traits;
pub mod evolution;
pub mod oracle;
pub mod export;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use evolution::{EvolutionConfig, OperatorConfig};
pub use oracle::OracleConfig;
pub use export::ExportConfig;
