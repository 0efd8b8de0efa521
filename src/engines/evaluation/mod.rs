pub mod dispatcher;
pub mod oracle;
pub mod parser;

pub use dispatcher::Dispatcher;
pub use oracle::{replay_command, Invocation, Oracle, ShellOracle};
pub use parser::ReportGrammar;
