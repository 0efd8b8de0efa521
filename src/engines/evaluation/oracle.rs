use crate::config::OracleConfig;
use crate::error::{DarwinError, Result};
use crate::types::Phenotype;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Keys that never make it onto a replayed command line
const REPLAY_SKIPPED_KEYS: [&str; 4] = ["selector", "filename", "show_options", "sim"];

/// Snapshot keys replaced by the current run's own window
const EXPORT_WINDOW_KEYS: [&str; 6] = ["selector", "strategy", "sim", "days", "start", "end"];

/// One `sim` run: strategy, market and `--name=value` arguments in order
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub strategy: String,
    pub selector: String,
    pub args: Vec<(String, String)>,
}

impl Invocation {
    /// Traits first, then the strategy name, then the fixed window arguments
    pub fn for_phenotype(strategy: &str, phenotype: &Phenotype, config: &OracleConfig) -> Self {
        let mut args: Vec<(String, String)> = phenotype
            .traits
            .iter()
            .filter(|(name, _)| name.as_str() != "selector" && name.as_str() != "sim")
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        args.push(("strategy".to_string(), strategy.to_string()));
        args.extend(config.simulation_args());

        Self {
            strategy: strategy.to_string(),
            selector: config.selector.clone(),
            args,
        }
    }

    /// Re-runs an exported parameter snapshot under the current window and
    /// capital. `None` when the snapshot names no strategy.
    pub fn for_exported(
        params: &std::collections::BTreeMap<String, serde_json::Value>,
        config: &OracleConfig,
    ) -> Option<Self> {
        let strategy = params.get("strategy").map(json_arg)?;
        let selector = params
            .get("selector")
            .map(json_arg)
            .unwrap_or_else(|| config.selector.clone());

        let fixed = config.simulation_args();
        let mut args: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| {
                !EXPORT_WINDOW_KEYS.contains(&key.as_str()) && !fixed.iter().any(|(k, _)| k == *key)
            })
            .map(|(key, value)| (key.clone(), json_arg(value)))
            .collect();
        args.push(("strategy".to_string(), strategy.clone()));
        args.extend(fixed);

        Some(Self {
            strategy,
            selector,
            args,
        })
    }

    pub fn arguments(&self) -> Vec<String> {
        let mut argv = vec!["sim".to_string(), self.selector.clone()];
        argv.extend(self.args.iter().map(|(k, v)| format!("--{}={}", k, v)));
        argv
    }

    pub fn command_line(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in self.arguments() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// The external simulation engine
pub trait Oracle: Send + Sync {
    /// Runs one simulation and returns its raw stdout
    fn simulate(&self, invocation: &Invocation) -> Result<String>;

    /// Pulls market history for `days` ahead of a generation
    fn backfill(&self, selector: &str, days: u32) -> Result<()>;

    fn command_line(&self, invocation: &Invocation) -> String {
        invocation.command_line("oracle")
    }
}

/// Runs the oracle as a child process per call
#[derive(Debug, Clone)]
pub struct ShellOracle {
    command: String,
    timeout: Option<Duration>,
}

impl ShellOracle {
    pub fn new(command: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(config.command.clone(), config.timeout_secs.map(Duration::from_secs))
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let command_line = format!("{} {}", self.command, args.join(" "));
        let invocation_error = |reason: String, stderr: String| DarwinError::OracleInvocation {
            command: command_line.clone(),
            reason,
            stderr,
        };

        let mut command = Command::new(&self.command);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Wrapper scripts fork the real simulator; give the tree its own group
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| invocation_error(format!("spawn failed: {}", e), String::new()))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let started = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if let Some(limit) = self.timeout {
                        if started.elapsed() >= limit {
                            kill_tree(&mut child);
                            // A descendant outside the group can still hold the
                            // pipes open, so the drain threads are left detached
                            return Err(invocation_error(
                                format!("timed out after {:?}", limit),
                                String::new(),
                            ));
                        }
                    }
                    thread::sleep(Duration::from_millis(25));
                }
            }
        };

        let stdout = stdout.map(collect).unwrap_or_default();
        let stderr = stderr.map(collect).unwrap_or_default();

        if !status.success() {
            return Err(invocation_error(format!("exited with {}", status), stderr));
        }
        Ok(stdout)
    }
}

/// Kills the child's whole process group, then reaps the child.
/// Both steps may fail if the child exited in between.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: signalling a process group has no memory-safety preconditions
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn collect(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

impl Oracle for ShellOracle {
    fn simulate(&self, invocation: &Invocation) -> Result<String> {
        self.run(&invocation.arguments())
    }

    fn backfill(&self, selector: &str, days: u32) -> Result<()> {
        let args = vec![
            "backfill".to_string(),
            format!("--days={}", days),
            selector.to_string(),
        ];
        log::info!("Backfilling (might take some time) ... {} {}", self.command, args.join(" "));
        self.run(&args).map(|_| ())
    }

    fn command_line(&self, invocation: &Invocation) -> String {
        invocation.command_line(&self.command)
    }
}

/// Ready-to-run `sim` command reproducing a result's canonical parameters
pub fn replay_command(
    program: &str,
    params: &std::collections::BTreeMap<String, serde_json::Value>,
    asset_capital: f64,
    currency_capital: f64,
) -> String {
    let mut line = format!("{} sim", program);
    if let Some(selector) = params.get("selector") {
        line.push(' ');
        line.push_str(&json_arg(selector));
    }
    for (key, value) in params {
        if REPLAY_SKIPPED_KEYS.contains(&key.as_str()) {
            continue;
        }
        line.push_str(&format!(" --{}={}", key, json_arg(value)));
    }
    line.push_str(&format!(
        " --asset_capital={} --currency_capital={}",
        asset_capital, currency_capital
    ));
    line
}

fn json_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
