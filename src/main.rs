use anyhow::Context;
use clap::Parser;
use darwin::config::{AppConfig, ConfigManager};
use darwin::data::load_population;
use darwin::engines::compare::ConfigComparison;
use darwin::engines::evaluation::ShellOracle;
use darwin::engines::generation::{ConsoleProgressCallback, EvolutionEngine};
use darwin::strategies::StrategyCatalog;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "darwin",
    version,
    about = "Evolves trading strategy parameters against an external simulator"
)]
struct Cli {
    /// TOML configuration file, layered under DARWIN_* environment variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Market selector, e.g. bitfinex.ETH-USD
    #[arg(long)]
    selector: Option<String>,

    #[arg(long)]
    days: Option<u32>,

    /// Window start, YYYYMMDDHHMM
    #[arg(long)]
    start: Option<String>,

    /// Window end, YYYYMMDDHHMM
    #[arg(long)]
    end: Option<String>,

    #[arg(long, alias = "currency_capital")]
    currency_capital: Option<f64>,

    #[arg(long, alias = "asset_capital")]
    asset_capital: Option<f64>,

    /// `all` or a comma separated list of strategies
    #[arg(long, alias = "use_strategies", default_value = "all")]
    use_strategies: String,

    /// Phenotypes per strategy
    #[arg(long)]
    population: Option<usize>,

    /// Generation JSON to seed the populations from
    #[arg(long, alias = "population_data")]
    population_data: Option<PathBuf>,

    /// Viability fitness cutoff
    #[arg(long)]
    fitness: Option<f64>,

    /// Viability roi cutoff, in percent
    #[arg(long)]
    roi: Option<f64>,

    /// Stop after this many generations
    #[arg(long)]
    generations: Option<usize>,

    /// Simulations run in parallel
    #[arg(long)]
    parallel: Option<usize>,

    #[arg(long, default_value_t = false)]
    no_backfill: bool,

    /// Re-simulate every exported configuration and keep the fittest as best.conf.json
    #[arg(long, default_value_t = false)]
    compare: bool,

    /// Only compare exports of this strategy
    #[arg(long, requires = "compare")]
    strategy: Option<String>,

    /// Exported configurations to compare, instead of the configured export directory
    #[arg(long, requires = "compare")]
    directory: Option<PathBuf>,

    /// Print the supported strategies and exit
    #[arg(long, default_value_t = false)]
    list_strategies: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(selector) = &self.selector {
            config.oracle.selector = selector.clone();
        }
        if self.start.is_some() || self.end.is_some() {
            config.oracle.days = None;
            config.oracle.start = self.start.clone();
            config.oracle.end = self.end.clone();
        }
        if let Some(days) = self.days {
            config.oracle.days = Some(days);
        }
        if let Some(capital) = self.currency_capital {
            config.oracle.currency_capital = capital;
        }
        if let Some(capital) = self.asset_capital {
            config.oracle.asset_capital = capital;
        }
        if let Some(population) = self.population {
            config.evolution.population_size = population;
        }
        if let Some(fitness) = self.fitness {
            config.evolution.fitness_cutoff = fitness;
        }
        if let Some(roi) = self.roi {
            config.evolution.roi_cutoff = roi;
        }
        if let Some(generations) = self.generations {
            config.evolution.max_generations = Some(generations);
        }
        if let Some(parallel) = self.parallel {
            config.oracle.parallel_limit = Some(parallel);
        }
        if self.no_backfill {
            config.oracle.backfill = false;
        }
        if let Some(directory) = &self.directory {
            config.export.export_dir = directory.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.list_strategies {
        for name in StrategyCatalog::new().names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut manager = ConfigManager::load(cli.config.as_deref()).context("Failed to load configuration")?;
    manager
        .update(|config| cli.apply(config))
        .context("Invalid command line override")?;
    let config = manager.get();

    if cli.compare {
        let oracle = ShellOracle::from_config(&config.oracle);
        let comparison = ConfigComparison::new(config.oracle, config.export)
            .context("Failed to set up comparison")?;
        let report = comparison.run(&oracle, cli.strategy.as_deref())?;
        for ranked in &report.ranked {
            match &ranked.result {
                Some(result) => println!("{:>10.4}  {}", result.fitness, ranked.path.display()),
                None => println!("{:>10}  {}", "failed", ranked.path.display()),
            }
        }
        return Ok(());
    }

    let imported = match &cli.population_data {
        Some(path) => load_population(path)
            .with_context(|| format!("Failed to import population from {}", path.display()))?,
        None => BTreeMap::new(),
    };

    let oracle = ShellOracle::from_config(&config.oracle);
    let mut engine = EvolutionEngine::new(config, oracle, &cli.use_strategies, imported)
        .context("Failed to set up evolution")?;

    let generations = engine.run(ConsoleProgressCallback)?;
    log::info!("Finished after {} generations", generations);
    Ok(())
}
