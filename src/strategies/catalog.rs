use super::range::{StrategyParameterSpec, TraitRange};
use crate::error::{DarwinError, Result};
use std::collections::BTreeMap;

const TREND_EMA_MIN: i64 = 10;
const TREND_EMA_MAX: i64 = 100;
const OVERSOLD_RSI_MIN: i64 = 20;
const OVERSOLD_RSI_MAX: i64 = 25;
const OVERSOLD_RSI_PERIODS_MIN: i64 = 3;
const OVERSOLD_RSI_PERIODS_MAX: i64 = 20;

/// Static table of every strategy the oracle knows how to simulate
pub struct StrategyCatalog {
    specs: BTreeMap<&'static str, StrategyParameterSpec>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        let mut catalog = Self {
            specs: BTreeMap::new(),
        };
        catalog.register_band_strategies();
        catalog.register_oscillator_strategies();
        catalog.register_trend_strategies();
        catalog.register_misc_strategies();
        catalog
    }

    pub fn get(&self, name: &str) -> Result<&StrategyParameterSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| DarwinError::UnknownStrategy(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.keys().map(|k| k.to_string()).collect()
    }

    /// Resolves `all` or a comma separated list of names
    pub fn select(&self, selection: &str) -> Result<Vec<String>> {
        if selection.trim() == "all" {
            return Ok(self.names());
        }
        let mut selected = Vec::new();
        for name in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            self.get(name)?;
            if !selected.iter().any(|s| s == name) {
                selected.push(name.to_string());
            }
        }
        if selected.is_empty() {
            return Err(DarwinError::Configuration(
                "No strategies selected".to_string(),
            ));
        }
        Ok(selected)
    }

    fn register(&mut self, name: &'static str, spec: StrategyParameterSpec) {
        self.specs.insert(name, spec);
    }

    fn register_band_strategies(&mut self) {
        self.register(
            "bollinger",
            common(TraitRange::period(5, 5, "m"), None, 3.0)
                .with("bollinger_size", TraitRange::int(10, 20))
                .with("bollinger_time", TraitRange::float(1.0, 6.0))
                .with("bollinger_upper_bound_pct", TraitRange::float(-1.0, 20.0))
                .with("bollinger_lower_bound_pct", TraitRange::float(-1.0, 20.0)),
        );
        self.register(
            "trend_bollinger",
            common(TraitRange::period(1, 60, "m"), None, 5.0)
                .with("bollinger_size", TraitRange::int(1, 40))
                .with("bollinger_time", TraitRange::float(1.0, 6.0))
                .with("bollinger_upper_bound_pct", TraitRange::float(-1.0, 30.0))
                .with("bollinger_lower_bound_pct", TraitRange::float(-1.0, 30.0)),
        );
        self.register(
            "crossover_vwap",
            common(TraitRange::period(1, 400, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("emalen1", TraitRange::int(1, 300))
                .with("smalen1", TraitRange::int(1, 300))
                .with("smalen2", TraitRange::int(1, 300))
                .with("vwap_length", TraitRange::int(1, 300))
                // 0 disables the cap
                .with("vwap_max", TraitRange::int_factor(0, 10000, 10)),
        );
        self.register(
            "stddev",
            markup(TraitRange::period(1, 7200, "s"), TraitRange::int(1, 2500))
                .with("trendtrades_1", TraitRange::int(2, 20))
                .with("trendtrades_2", TraitRange::int(4, 100)),
        );
    }

    fn register_oscillator_strategies(&mut self) {
        self.register(
            "cci_srsi",
            common(TraitRange::period(5, 15, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("cci_periods", TraitRange::int(1, 200))
                .with("rsi_periods", TraitRange::int(1, 200))
                .with("srsi_periods", TraitRange::int(1, 200))
                .with("srsi_k", TraitRange::int(1, 50))
                .with("srsi_d", TraitRange::int(1, 50))
                .with("oversold_rsi", TraitRange::int(1, 20))
                .with("overbought_rsi", TraitRange::int(80, 100))
                .with("oversold_cci", TraitRange::int(-100, 100))
                .with("overbought_cci", TraitRange::int(1, 100))
                .with("constant", TraitRange::float(0.001, 0.05)),
        );
        self.register(
            "srsi_macd",
            common(TraitRange::period(5, 15, "m"), Some(TraitRange::int(1, 50)), 5.0)
                .with("rsi_periods", TraitRange::int(5, 50))
                .with("srsi_periods", TraitRange::int(5, 100))
                .with("srsi_k", TraitRange::int(5, 50))
                .with("srsi_d", TraitRange::int(5, 50))
                .with("oversold_rsi", TraitRange::int(20, 20))
                .with("overbought_rsi", TraitRange::int(80, 80))
                .with("ema_short_period", TraitRange::int(1, 20))
                .with("ema_long_period", TraitRange::int(20, 100))
                .with("signal_period", TraitRange::int(1, 20))
                .with("up_trend_threshold", TraitRange::int(1, 20))
                .with("down_trend_threshold", TraitRange::int(1, 20)),
        );
        self.register(
            "rsi",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("rsi_periods", TraitRange::int(1, 200))
                .with("oversold_rsi", TraitRange::int(1, 100))
                .with("overbought_rsi", TraitRange::int(1, 100))
                .with("rsi_recover", TraitRange::int(1, 100))
                .with("rsi_drop", TraitRange::int(0, 100))
                .with("rsi_divisor", TraitRange::int(1, 10)),
        );
        self.register(
            "wavetrend",
            markup(TraitRange::period(1, 120, "m"), TraitRange::int(1, 200))
                .with("wavetrend_channel_length", TraitRange::int(1, 20))
                .with("wavetrend_average_length", TraitRange::int(1, 42))
                .with("wavetrend_overbought_1", TraitRange::int(1, 100))
                .with("wavetrend_overbought_2", TraitRange::int(1, 100))
                .with("wavetrend_oversold_1", TraitRange::int(-100, 0))
                .with("wavetrend_oversold_2", TraitRange::int(-100, 0))
                .with("wavetrend_trends", TraitRange::Bool),
        );
        self.register(
            "momentum",
            markup(TraitRange::period(1, 120, "m"), TraitRange::int(1, 2500))
                .with("momentum_size", TraitRange::int(1, 20)),
        );
    }

    fn register_trend_strategies(&mut self) {
        self.register(
            "macd",
            common(TraitRange::period(5, 5, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("ema_short_period", TraitRange::int(1, 20))
                .with("ema_long_period", TraitRange::int(20, 100))
                .with("signal_period", TraitRange::int(1, 20))
                .with("up_trend_threshold", TraitRange::int(1, 50))
                .with("down_trend_threshold", TraitRange::int(1, 50))
                .with("overbought_rsi_periods", TraitRange::int(1, 20))
                .with("overbought_rsi", TraitRange::int(80, 100)),
        );
        // talib rejects short periods below 2
        self.register(
            "ta_macd",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("ema_short_period", TraitRange::int(2, 20))
                .with("ema_long_period", TraitRange::int(20, 100))
                .with("signal_period", TraitRange::int(1, 20))
                .with("up_trend_threshold", TraitRange::int(0, 50))
                .with("down_trend_threshold", TraitRange::int(0, 50))
                .with("overbought_rsi_periods", TraitRange::int(1, 50))
                .with("overbought_rsi", TraitRange::int(20, 100)),
        );
        self.register(
            "trend_ema",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 100)), 5.0)
                .with("trend_ema", TraitRange::int(TREND_EMA_MIN, TREND_EMA_MAX))
                .with(
                    "oversold_rsi_periods",
                    TraitRange::int(OVERSOLD_RSI_PERIODS_MIN, OVERSOLD_RSI_PERIODS_MAX),
                )
                .with("oversold_rsi", TraitRange::int(OVERSOLD_RSI_MIN, OVERSOLD_RSI_MAX)),
        );
        self.register(
            "ta_ema",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 100)), 5.0)
                .with("trend_ema", TraitRange::int(TREND_EMA_MIN, TREND_EMA_MAX))
                .with(
                    "oversold_rsi_periods",
                    TraitRange::int(OVERSOLD_RSI_PERIODS_MIN, OVERSOLD_RSI_PERIODS_MAX),
                )
                .with("oversold_rsi", TraitRange::int(OVERSOLD_RSI_MIN, OVERSOLD_RSI_MAX)),
        );
        self.register(
            "trendline",
            common(TraitRange::period(1, 400, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("lastpoints", TraitRange::int(20, 500))
                .with("avgpoints", TraitRange::int(300, 3000))
                .with("lastpoints2", TraitRange::int(5, 300))
                .with("avgpoints2", TraitRange::int(50, 1000)),
        );
        self.register(
            "dema",
            StrategyParameterSpec::new()
                .with("period_length", TraitRange::period(10, 60, "m"))
                .with("min_periods", TraitRange::int(1, 30))
                .with("markdown_buy_pct", TraitRange::float(-1.0, 2.0))
                .with("markup_sell_pct", TraitRange::float(-1.0, 2.0))
                .with("order_type", TraitRange::MakerTaker)
                .with("sell_stop_pct", TraitRange::int(1, 40))
                .with("buy_stop_pct", TraitRange::int(1, 40))
                .with("profit_stop_enable_pct", TraitRange::int(1, 20))
                .with("profit_stop_pct", TraitRange::int(1, 20))
                .with("ema_short_period", TraitRange::int(1, 5))
                .with("ema_long_period", TraitRange::int(6, 50))
                .with("signal_period", TraitRange::int(1, 20))
                .with("up_trend_threshold", TraitRange::int(0, 50))
                .with("down_trend_threshold", TraitRange::int(0, 50))
                .with("overbought_rsi_periods", TraitRange::int(1, 30))
                .with("overbought_rsi", TraitRange::int(70, 95))
                .with("noise_level_pct", TraitRange::int(1, 5)),
        );
        self.register(
            "sar",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(2, 100)), 5.0)
                .with("sar_af", TraitRange::float(0.01, 1.0))
                .with("sar_max_af", TraitRange::float(0.01, 1.0)),
        );
    }

    fn register_misc_strategies(&mut self) {
        self.register(
            "neural",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 200)), 5.0)
                .with("neurons_1", TraitRange::int(1, 200))
                .with("activation_1_type", TraitRange::Activation)
                .with("depth", TraitRange::int(1, 100))
                .with("min_predict", TraitRange::int(1, 100))
                .with("momentum", TraitRange::int(0, 100))
                .with("decay", TraitRange::int(1, 10))
                .with("learns", TraitRange::int(1, 200)),
        );
        self.register(
            "speed",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 100)), 5.0)
                .with("baseline_periods", TraitRange::int(1, 5000))
                .with("trigger_factor", TraitRange::float(0.1, 10.0)),
        );
        self.register(
            "trust_distrust",
            common(TraitRange::period(1, 120, "m"), Some(TraitRange::int(1, 100)), 5.0)
                .with("sell_threshold", TraitRange::int(1, 100))
                .with("sell_threshold_max", TraitRange::int_or_zero(1, 100))
                .with("sell_min", TraitRange::int(1, 100))
                .with("buy_threshold", TraitRange::int(1, 100))
                .with("buy_threshold_max", TraitRange::int_or_zero(1, 100))
                .with("greed", TraitRange::int(1, 100)),
        );
    }
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Period, order handling and stop traits shared by the markdown/markup strategies
fn common(period: TraitRange, min_periods: Option<TraitRange>, pct_max: f64) -> StrategyParameterSpec {
    let mut spec = StrategyParameterSpec::new().with("period_length", period);
    if let Some(range) = min_periods {
        spec = spec.with("min_periods", range);
    }
    with_stops(
        spec.with("markdown_buy_pct", TraitRange::float(-1.0, pct_max))
            .with("markup_sell_pct", TraitRange::float(-1.0, pct_max)),
    )
}

/// Common block for strategies that take a single `markup_pct`
fn markup(period: TraitRange, min_periods: TraitRange) -> StrategyParameterSpec {
    with_stops(
        StrategyParameterSpec::new()
            .with("period_length", period)
            .with("min_periods", min_periods)
            .with("markup_pct", TraitRange::float(0.0, 5.0)),
    )
}

fn with_stops(spec: StrategyParameterSpec) -> StrategyParameterSpec {
    spec.with("order_type", TraitRange::MakerTaker)
        .with("sell_stop_pct", TraitRange::int_or_zero(1, 50))
        .with("buy_stop_pct", TraitRange::int_or_zero(1, 50))
        .with("profit_stop_enable_pct", TraitRange::int_or_zero(1, 20))
        .with("profit_stop_pct", TraitRange::int(1, 20))
}
