use darwin::config::AppConfig;
use darwin::data::load_population;
use darwin::engines::evaluation::{Invocation, Oracle};
use darwin::engines::generation::{ChannelProgressCallback, EvolutionEngine, ProgressMessage};
use darwin::{DarwinError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// In-process stand-in for the simulator. The `fail_on`-th call exits non-zero.
#[derive(Clone)]
struct ScriptedOracle {
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    backfills: Arc<AtomicUsize>,
    fail_on: Option<usize>,
    losing: bool,
}

impl ScriptedOracle {
    fn new(fail_on: Option<usize>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            backfills: Arc::new(AtomicUsize::new(0)),
            fail_on,
            losing: false,
        }
    }

    /// Every run loses money against buy and hold
    fn losing() -> Self {
        Self {
            losing: true,
            ..Self::new(None)
        }
    }
}

impl Oracle for ScriptedOracle {
    fn simulate(&self, invocation: &Invocation) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Some(call) == self.fail_on {
            return Err(DarwinError::OracleInvocation {
                command: self.command_line(invocation),
                reason: "exited with 1".to_string(),
                stderr: "simulated crash".to_string(),
            });
        }

        let arg = |key: &str| {
            invocation
                .args
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let summary = if self.losing {
            "end balance: 900.00 (-10.00%)\nbuy hold: 1000.00 (0.00%)\nvs. buy hold: -10.00%\nwin/loss: 2/6\nerror rate: 75.00%\n"
        } else {
            "end balance: 1100.00 (10.00%)\nbuy hold: 550.00 (-45.00%)\nvs. buy hold: 100.00%\nwin/loss: 6/2\nerror rate: 25.00%\n"
        };
        Ok(format!(
            "{{\n  \"selector\": {{\"normalized\": \"{}\"}},\n  \"strategy\": \"{}\",\n  \"days\": {},\n  \"currency_capital\": {},\n  \"mode\": \"sim\"\n}}\n{}",
            invocation.selector,
            invocation.strategy,
            arg("days"),
            arg("currency_capital"),
            summary,
        ))
    }

    fn backfill(&self, _selector: &str, _days: u32) -> Result<()> {
        self.backfills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.evolution.population_size = 4;
    config.evolution.elitism_count = 1;
    config.evolution.seed = Some(7);
    config.oracle.selector = "test.BTC-USD".to_string();
    config.oracle.days = Some(10);
    config.oracle.parallel_limit = Some(2);
    config.export.export_dir = root.join("strategies");
    config.export.simulations_dir = root.join("simulations");
    config
}

#[test]
fn test_generation_degrades_one_failure_and_keeps_size() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new(Some(2));
    let scripted = oracle.clone();
    let mut engine = EvolutionEngine::new(config(dir.path()), oracle, "rsi", BTreeMap::new()).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut callback = ChannelProgressCallback::new(tx);
    let summary = engine.step(&mut callback).unwrap();

    assert_eq!(summary.generation, 1);
    assert_eq!(summary.tasks, 4);
    assert_eq!(summary.evaluated, 3);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.deaths, 1);
    assert_eq!(summary.leaderboard_size, 3);
    assert_eq!(engine.strategies()[0].population().len(), 4);

    assert_eq!(scripted.calls.load(Ordering::SeqCst), 4);
    assert!(scripted.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(scripted.backfills.load(Ordering::SeqCst), 1);

    assert!(summary.record.leaderboard.exists());
    assert!(summary.record.populations.exists());

    assert_eq!(summary.exported, vec!["rsi".to_string()]);
    let export = dir.path().join("strategies").join("test.BTC-USD").join("10");
    assert!(export.join("rsi.conf.json").exists());
    assert!(export.join("rsi_results.json").exists());
    assert!(export.join("rsi_data.json").exists());

    let messages: Vec<ProgressMessage> = rx.try_iter().collect();
    assert_eq!(messages[0], ProgressMessage::GenerationStart { generation: 1, tasks: 4 });
    assert_eq!(messages[1], ProgressMessage::GenerationComplete(summary));
}

#[test]
fn test_run_stops_at_generation_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.evolution.max_generations = Some(2);
    config.oracle.backfill = false;
    let oracle = ScriptedOracle::new(None);
    let scripted = oracle.clone();

    let mut engine = EvolutionEngine::new(config, oracle, "rsi,macd", BTreeMap::new()).unwrap();
    let (tx, rx) = mpsc::channel();
    let generations = engine.run(ChannelProgressCallback::new(tx)).unwrap();

    assert_eq!(generations, 2);
    assert_eq!(engine.generation(), 2);
    assert_eq!(scripted.calls.load(Ordering::SeqCst), 16);
    assert_eq!(scripted.backfills.load(Ordering::SeqCst), 0);
    for state in engine.strategies() {
        assert_eq!(state.population().len(), 4);
        assert!(state.best().is_some());
    }

    let completed = rx
        .try_iter()
        .filter(|m| matches!(m, ProgressMessage::GenerationComplete(_)))
        .count();
    assert_eq!(completed, 2);
}

#[test]
fn test_generation_dump_seeds_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine =
        EvolutionEngine::new(config(dir.path()), ScriptedOracle::new(None), "trend_ema", BTreeMap::new())
            .unwrap();
    let (tx, _rx) = mpsc::channel();
    let summary = engine.step(&mut ChannelProgressCallback::new(tx)).unwrap();

    let imported = load_population(&summary.record.populations).unwrap();
    let expected = imported["trend_ema"].clone();
    assert_eq!(expected.len(), 4);

    let resumed =
        EvolutionEngine::new(config(dir.path()), ScriptedOracle::new(None), "trend_ema", imported)
            .unwrap();
    let seeded = resumed.strategies()[0].population();
    assert_eq!(seeded.len(), expected.len());
    for (resumed, dumped) in seeded.iter().zip(&expected) {
        assert_eq!(
            resumed.traits.keys().collect::<Vec<_>>(),
            dumped.traits.keys().collect::<Vec<_>>()
        );
        assert_eq!(resumed.get("period_length"), dumped.get("period_length"));
        assert_eq!(resumed.sim.is_some(), dumped.sim.is_some());
    }
}

#[test]
fn test_unprofitable_best_is_not_exported() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine =
        EvolutionEngine::new(config(dir.path()), ScriptedOracle::losing(), "rsi", BTreeMap::new()).unwrap();
    let (tx, _rx) = mpsc::channel();
    let summary = engine.step(&mut ChannelProgressCallback::new(tx)).unwrap();

    assert_eq!(summary.evaluated, 4);
    assert!(summary.exported.is_empty());
    let best = engine.strategies()[0].best().unwrap();
    assert!(best.sim.as_ref().unwrap().fitness <= 0.0);
    assert!(!dir.path().join("strategies").exists());
}

#[test]
fn test_unknown_strategy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let result = EvolutionEngine::new(config(dir.path()), ScriptedOracle::new(None), "rsi,nope", BTreeMap::new());
    assert!(matches!(result, Err(DarwinError::UnknownStrategy(_))));
}
