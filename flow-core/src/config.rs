//! Runtime configuration surface (§6, §6.1).
//!
//! One nested, `serde`-deserialized tree loaded from a TOML file given on
//! the CLI. Every field enumerated in §6 as a trading threshold has *no*
//! implicit default — a missing field is a hard deserialization error,
//! which the caller (`main`) turns into a `Fatal`-class exit before the
//! pipeline ever opens an input channel. Only genuinely operational fields
//! (metrics bind address, log level) get a `#[serde(default = "fn")]`,
//! mirroring the host project's `config::types` split between trading
//! thresholds (always explicit) and cold-path operational settings
//! (safe to default).

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for one symbol's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub symbol: String,
    /// Base tick size all zone geometry and price alignment derives from.
    pub tick_size: Decimal,
    pub zones: ZonesConfig,
    pub absorption: AbsorptionConfig,
    pub exhaustion: ExhaustionConfig,
    pub accumulation: AccumulationDistributionConfig,
    pub distribution: AccumulationDistributionConfig,
    pub indicators: IndicatorsConfig,
    pub signal_manager: SignalManagerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// One zone resolution's geometry plus cache tuning (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneResolutionSpec {
    /// Number of base ticks comprising one zone at this resolution (e.g. 1, 2, 4).
    pub zone_ticks: u32,
    /// Trailing time window, in milliseconds, for this resolution.
    pub time_window_ms: i64,
    /// Maximum distinct zones retained for this resolution.
    pub zone_cache_size: usize,
    /// Zones untouched longer than this are dropped regardless of cache size.
    pub max_zone_cache_age_ms: i64,
}

/// §4.3 zone aggregator configuration: one entry per resolution plus the
/// shared reporting range and trade-history capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesConfig {
    pub resolutions: Vec<ZoneResolutionSpec>,
    /// How many ticks around the current price a zone must fall within to
    /// be included in the snapshot list handed to detectors.
    pub zone_calculation_range_ticks: u32,
    /// Bounded trade-history ring capacity per zone.
    pub trade_history_capacity: usize,
}

/// §4.5 absorption detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsorptionConfig {
    pub min_agg_volume: Decimal,
    pub passive_absorption_threshold: Decimal,
    pub price_efficiency_threshold: Decimal,
    pub expected_movement_scaling_factor: Decimal,
    pub event_cooldown_ms: i64,
    pub final_confidence_required: Decimal,
    /// Base confidence assigned before any boosts, before clamping.
    pub base_confidence: Decimal,

    // Multi-timeframe confluence (optional enhancement, step 5).
    pub confluence_confidence_boost: Decimal,
    pub min_zone_confluence_count: u32,
    pub max_zone_confluence_distance_ticks: u32,
    pub confluence_distance_weight: Decimal,
    pub confluence_volume_weight: Decimal,
    pub confluence_ratio_weight: Decimal,

    // Institutional-volume filter (optional enhancement, step 6).
    pub institutional_volume_threshold: Decimal,
    pub institutional_volume_ratio_threshold: Decimal,
    pub institutional_volume_boost: Decimal,

    /// Bounded near-spread zone-state cache for the absorption state
    /// machine (§4.5 "State machine per near-spread zone").
    pub tracked_zone_cache_size: usize,
}

/// §4.6 exhaustion detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustionConfig {
    pub min_agg_volume: Decimal,
    pub min_depletion_factor: Decimal,
    pub depletion_ratio_threshold: Decimal,
    pub depletion_volume_threshold: Decimal,
    pub base_confidence: Decimal,
    pub max_zones: usize,
    pub zone_age_limit_ms: i64,
    pub circuit_breaker_max_errors: u64,
    pub circuit_breaker_window_ms: u64,
}

/// §4.7 accumulation/distribution detector configuration. Accumulation and
/// distribution share this shape, parameterized at construction by which
/// side is dominant (see `detectors::accumulation_distribution::Side`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulationDistributionConfig {
    pub min_candidate_duration_ms: i64,
    pub dominant_ratio_threshold: Decimal,
    pub min_trade_count: u32,
    pub max_price_deviation_percent: Decimal,
    pub min_institutional_score: Decimal,
    pub strength_change_threshold: Decimal,
    pub base_confidence: Decimal,
    pub max_tracked_zones: usize,
}

/// §4.8 VWAP filter window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VwapFilterConfig {
    pub window_ms: i64,
    pub max_deviation_percent: Decimal,
}

/// §4.8 RSI filter window and overbought/oversold thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiFilterConfig {
    pub period: usize,
    pub overbought: Decimal,
    pub oversold: Decimal,
}

/// §4.8 OIR filter window, thresholds, and the minimum sample volume below
/// which the filter is undefined and passes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OirFilterConfig {
    pub window_ms: i64,
    pub high_threshold: Decimal,
    pub low_threshold: Decimal,
    pub min_volume_threshold: Decimal,
}

/// How the three filters combine into one overall decision (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    All,
    Majority,
    Any,
}

/// Per-filter weights plus the combination mode. A weight of zero excludes
/// that filter from both the vote and the denominator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStrengthConfig {
    pub vwap_weight: Decimal,
    pub rsi_weight: Decimal,
    pub oir_weight: Decimal,
    pub combination_mode: CombinationMode,
}

/// §4.8 TraditionalIndicators configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorsConfig {
    pub enabled: bool,
    pub vwap: VwapFilterConfig,
    pub rsi: RsiFilterConfig,
    pub oir: OirFilterConfig,
    pub filter_strength: FilterStrengthConfig,
}

/// §4.9 signal manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalManagerConfig {
    pub confidence_threshold: Decimal,
    pub signal_timeout_ms: i64,
    pub correlation_window_ms: i64,
    pub max_history_size: usize,
    pub correlation_boost_factor: Decimal,
    pub maintenance_interval_ms: i64,
}

/// Ambient monitoring configuration (added, §1.1): the Prometheus bind
/// address is operational, not a trading threshold, so it is the one field
/// in this tree with a safe default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_metrics_server: bool,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics_server: true,
            metrics_addr: default_metrics_addr(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Ambient pipeline/concurrency configuration (added, §5): bounded input
/// channel capacity and the shutdown drain deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_channel_capacity")]
    pub input_channel_capacity: usize,
    #[serde(default = "default_shutdown_drain_ms")]
    pub shutdown_drain_deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_channel_capacity: default_channel_capacity(),
            shutdown_drain_deadline_ms: default_shutdown_drain_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_capacity() -> usize {
    4096
}

fn default_shutdown_drain_ms() -> u64 {
    10_000
}

impl Config {
    /// Loads and validates configuration from a TOML file. Any missing
    /// required field or semantic violation is a `Fatal`-class
    /// [`ConfigError`] — the caller must exit before opening any channel.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates semantic invariants `serde` itself cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zones.resolutions.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "zones.resolutions must not be empty".into(),
            });
        }
        if self.tick_size <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                reason: "tick_size must be positive".into(),
            });
        }
        for res in &self.zones.resolutions {
            if res.zone_ticks == 0 {
                return Err(ConfigError::Invalid {
                    reason: "zone_ticks must be non-zero".into(),
                });
            }
            if res.time_window_ms <= 0 {
                return Err(ConfigError::Invalid {
                    reason: "time_window_ms must be positive".into(),
                });
            }
        }

        let weights = [
            self.indicators.filter_strength.vwap_weight,
            self.indicators.filter_strength.rsi_weight,
            self.indicators.filter_strength.oir_weight,
        ];
        if self.indicators.enabled && weights.iter().all(|w| w.is_zero()) {
            return Err(ConfigError::Invalid {
                reason: "at least one of vwap/rsi/oir weight must be non-zero when indicators are enabled".into(),
            });
        }

        if self.signal_manager.confidence_threshold < Decimal::ZERO
            || self.signal_manager.confidence_threshold > Decimal::ONE
        {
            return Err(ConfigError::Invalid {
                reason: "signal_manager.confidence_threshold must be in [0, 1]".into(),
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "invalid log level '{}', must be one of {:?}",
                    self.monitoring.log_level, valid_log_levels
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_toml() -> &'static str {
        r#"
symbol = "LTCUSDT"
tick_size = "0.01"

[zones]
zone_calculation_range_ticks = 50
trade_history_capacity = 256
resolutions = [
    { zone_ticks = 1, time_window_ms = 30000, zone_cache_size = 200, max_zone_cache_age_ms = 3600000 },
    { zone_ticks = 2, time_window_ms = 60000, zone_cache_size = 200, max_zone_cache_age_ms = 3600000 },
    { zone_ticks = 4, time_window_ms = 180000, zone_cache_size = 200, max_zone_cache_age_ms = 3600000 },
]

[absorption]
min_agg_volume = "20"
passive_absorption_threshold = "0.65"
price_efficiency_threshold = "0.3"
expected_movement_scaling_factor = "1"
event_cooldown_ms = 5000
final_confidence_required = "0.3"
base_confidence = "0.5"
confluence_confidence_boost = "0.1"
min_zone_confluence_count = 2
max_zone_confluence_distance_ticks = 3
confluence_distance_weight = "0.3"
confluence_volume_weight = "0.3"
confluence_ratio_weight = "0.4"
institutional_volume_threshold = "200"
institutional_volume_ratio_threshold = "0.8"
institutional_volume_boost = "0.15"
tracked_zone_cache_size = 64

[exhaustion]
min_agg_volume = "20"
min_depletion_factor = "0.5"
depletion_ratio_threshold = "0.6"
depletion_volume_threshold = "20"
base_confidence = "0.5"
max_zones = 64
zone_age_limit_ms = 3600000
circuit_breaker_max_errors = 5
circuit_breaker_window_ms = 60000

[accumulation]
min_candidate_duration_ms = 300000
dominant_ratio_threshold = "0.65"
min_trade_count = 10
max_price_deviation_percent = "0.5"
min_institutional_score = "0.5"
strength_change_threshold = "0.1"
base_confidence = "0.5"
max_tracked_zones = 64

[distribution]
min_candidate_duration_ms = 300000
dominant_ratio_threshold = "0.65"
min_trade_count = 10
max_price_deviation_percent = "0.5"
min_institutional_score = "0.5"
strength_change_threshold = "0.1"
base_confidence = "0.5"
max_tracked_zones = 64

[indicators]
enabled = true

[indicators.vwap]
window_ms = 900000
max_deviation_percent = "1.5"

[indicators.rsi]
period = 14
overbought = "70"
oversold = "30"

[indicators.oir]
window_ms = 300000
high_threshold = "0.65"
low_threshold = "0.35"
min_volume_threshold = "10"

[indicators.filter_strength]
vwap_weight = "0.3"
rsi_weight = "0.4"
oir_weight = "0.3"
combination_mode = "majority"

[signal_manager]
confidence_threshold = "0.75"
signal_timeout_ms = 300000
correlation_window_ms = 600000
max_history_size = 1000
correlation_boost_factor = "0.15"
maintenance_interval_ms = 60000
"#
    }

    #[test]
    fn loads_full_config_from_toml() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.symbol, "LTCUSDT");
        assert_eq!(config.tick_size, dec!(0.01));
        assert_eq!(config.zones.resolutions.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let broken = sample_toml().replace("symbol = \"LTCUSDT\"\n", "");
        let result: Result<Config, _> = toml::from_str(&broken);
        assert!(result.is_err());
    }

    #[test]
    fn empty_resolutions_rejected_by_validate() {
        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.zones.resolutions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn confidence_threshold_out_of_range_rejected() {
        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.signal_manager.confidence_threshold = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn monitoring_defaults_apply_when_absent() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        assert!(config.monitoring.enable_metrics_server);
        assert_eq!(config.monitoring.metrics_addr, "127.0.0.1:9090");
    }

    #[test]
    fn load_reads_and_validates_a_config_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        file.write_all(sample_toml().as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.symbol, "LTCUSDT");
    }

    #[test]
    fn load_surfaces_io_error_for_missing_file() {
        let err = Config::load("/nonexistent/path/to/flow.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_surfaces_fatal_error_for_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        file.write_all(b"not = [valid").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
