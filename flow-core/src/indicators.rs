//! Traditional indicators (VWAP/RSI/OIR) used as an optional post-filter
//! on detector candidates (§4.8).
//!
//! Grounded in the same pure-function style as the host project's
//! `orderbook::depth` module (`calculate_vwap`, `calculate_imbalance`):
//! stateless aggregation over a window of trade samples, except operating
//! on [`Decimal`] rather than the host's raw integer fixed-point, since
//! this system's correctness requirement (≥8 fractional digits, no float)
//! is better served by `Decimal`'s tracked scale.
//!
//! The non-obvious part is §4.8's signal-type-aware semantics: a
//! `Reversal`-classified signal (only [`SignalType::Absorption`] in this
//! system, see [`crate::model::FilterClass`]) treats the *matching*
//! extreme as confirmation and only the *opposite* extreme as
//! disqualifying, while a `Trend`-classified signal treats *either*
//! extreme as a warning that the move is exhausted and filters both —
//! continuation signals don't want to ride into an extreme in any
//! direction, reversal signals specifically want to have caught one.

use rust_decimal::Decimal;

use crate::config::{CombinationMode, IndicatorsConfig};
use crate::financial_math::divide_quantities;
use crate::model::{AggressorSide, FilterClass, Side, TimestampMs};
use crate::ring_buffer::RingBuffer;

/// One (price, quantity, timestamp, aggressor) sample fed to every
/// windowed indicator below.
#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: TimestampMs,
    price: Decimal,
    quantity: Decimal,
    aggressor: AggressorSide,
}

/// Rolling VWAP over a trailing time window (§4.8 "VWAP").
struct VwapTracker {
    window_ms: i64,
    samples: RingBuffer<Sample>,
}

impl VwapTracker {
    fn new(window_ms: i64, capacity: usize) -> Self {
        Self {
            window_ms,
            samples: RingBuffer::new(capacity),
        }
    }

    fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
        let cutoff = sample.timestamp - self.window_ms;
        self.samples.retain(|s| s.timestamp >= cutoff);
    }

    /// `Σ(price·volume) / Σ(volume)` over the window, `None` if empty.
    fn vwap(&self) -> Option<Decimal> {
        let mut notional = Decimal::ZERO;
        let mut volume = Decimal::ZERO;
        for s in self.samples.iter() {
            notional += s.price * s.quantity;
            volume += s.quantity;
        }
        divide_quantities(notional, volume)
    }

    /// Percentage deviation of `price` from the current VWAP, signed:
    /// positive when `price` is above VWAP.
    fn deviation_percent(&self, price: Decimal) -> Option<Decimal> {
        let vwap = self.vwap()?;
        if vwap.is_zero() {
            return None;
        }
        Some(((price - vwap) / vwap) * Decimal::from(100))
    }
}

/// Wilder-smoothed RSI over a fixed trade-count period (§4.8 "RSI").
struct RsiTracker {
    period: usize,
    last_price: Option<Decimal>,
    seed_gains: Vec<Decimal>,
    seed_losses: Vec<Decimal>,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
}

impl RsiTracker {
    fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            last_price: None,
            seed_gains: Vec::with_capacity(period),
            seed_losses: Vec::with_capacity(period),
            avg_gain: None,
            avg_loss: None,
        }
    }

    fn push(&mut self, price: Decimal) {
        let Some(last) = self.last_price else {
            self.last_price = Some(price);
            return;
        };
        self.last_price = Some(price);

        let delta = price - last;
        let gain = delta.max(Decimal::ZERO);
        let loss = (-delta).max(Decimal::ZERO);

        if self.avg_gain.is_none() {
            self.seed_gains.push(gain);
            self.seed_losses.push(loss);
            if self.seed_gains.len() == self.period {
                let n = Decimal::from(self.period as u64);
                self.avg_gain = Some(self.seed_gains.iter().copied().sum::<Decimal>() / n);
                self.avg_loss = Some(self.seed_losses.iter().copied().sum::<Decimal>() / n);
            }
            return;
        }

        let n = Decimal::from(self.period as u64);
        let alpha = Decimal::ONE / n;
        let prev_gain = self.avg_gain.unwrap();
        let prev_loss = self.avg_loss.unwrap();
        self.avg_gain = Some(prev_gain * (Decimal::ONE - alpha) + gain * alpha);
        self.avg_loss = Some(prev_loss * (Decimal::ONE - alpha) + loss * alpha);
    }

    /// `None` until the initial SMA seed period has elapsed. `100` when
    /// `avg_loss == 0 ∧ avg_gain > 0`; `50` when both are zero.
    fn rsi(&self) -> Option<Decimal> {
        let avg_gain = self.avg_gain?;
        let avg_loss = self.avg_loss?;

        if avg_loss.is_zero() {
            return Some(if avg_gain.is_zero() {
                Decimal::from(50)
            } else {
                Decimal::from(100)
            });
        }
        let rs = avg_gain / avg_loss;
        Some(Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs))
    }
}

/// Rolling order-imbalance ratio over a trailing time window (§4.8
/// "OIR").
struct OirTracker {
    window_ms: i64,
    min_volume_threshold: Decimal,
    samples: RingBuffer<Sample>,
}

impl OirTracker {
    fn new(window_ms: i64, min_volume_threshold: Decimal, capacity: usize) -> Self {
        Self {
            window_ms,
            min_volume_threshold,
            samples: RingBuffer::new(capacity),
        }
    }

    fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
        let cutoff = sample.timestamp - self.window_ms;
        self.samples.retain(|s| s.timestamp >= cutoff);
    }

    /// `buyVolume / totalVolume`, `None` (pass-through) when the window's
    /// total volume is below `min_volume_threshold`.
    fn oir(&self) -> Option<Decimal> {
        let mut buy = Decimal::ZERO;
        let mut total = Decimal::ZERO;
        for s in self.samples.iter() {
            total += s.quantity;
            if s.aggressor == AggressorSide::Buy {
                buy += s.quantity;
            }
        }
        if total < self.min_volume_threshold {
            return None;
        }
        divide_quantities(buy, total)
    }
}

/// A point-in-time reading of all three indicators, used for logging and
/// for the per-filter pass/filter decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorReadings {
    pub vwap: Option<Decimal>,
    pub vwap_deviation_percent: Option<Decimal>,
    pub rsi: Option<Decimal>,
    pub oir: Option<Decimal>,
}

/// Owns the three rolling trackers and renders a pass/filter decision for
/// one candidate signal (§4.8).
pub struct TraditionalIndicators {
    config: IndicatorsConfig,
    vwap: VwapTracker,
    rsi: RsiTracker,
    oir: OirTracker,
}

impl TraditionalIndicators {
    pub fn new(config: IndicatorsConfig) -> Self {
        let vwap = VwapTracker::new(config.vwap.window_ms, 4096);
        let rsi = RsiTracker::new(config.rsi.period);
        let oir = OirTracker::new(config.oir.window_ms, config.oir.min_volume_threshold, 4096);
        Self {
            config,
            vwap,
            rsi,
            oir,
        }
    }

    /// Feeds one enriched trade's price/quantity/aggressor into every
    /// rolling tracker. Must be called once per trade, in order, whether
    /// or not the filter is ultimately consulted for a candidate.
    pub fn update(&mut self, timestamp: TimestampMs, price: Decimal, quantity: Decimal, aggressor: AggressorSide) {
        let sample = Sample {
            timestamp,
            price,
            quantity,
            aggressor,
        };
        self.vwap.push(sample);
        self.rsi.push(price);
        self.oir.push(sample);
    }

    /// Current readings, independent of any particular candidate.
    pub fn readings(&self, price: Decimal) -> IndicatorReadings {
        IndicatorReadings {
            vwap: self.vwap.vwap(),
            vwap_deviation_percent: self.vwap.deviation_percent(price),
            rsi: self.rsi.rsi(),
            oir: self.oir.oir(),
        }
    }

    /// Whether a candidate of `class`/`side` at `price` passes the
    /// combined VWAP/RSI/OIR filter (§4.8 "Overall decision"). Returns
    /// `true` (pass) when indicators are disabled or every enabled
    /// filter's reading is currently undefined.
    pub fn passes(&self, class: FilterClass, side: Side, price: Decimal) -> bool {
        if !self.config.enabled {
            return true;
        }
        let readings = self.readings(price);
        let weights = &self.config.filter_strength;

        let mut votes: Vec<(Decimal, bool)> = Vec::with_capacity(3);

        if !weights.vwap_weight.is_zero() {
            if let Some(deviation) = readings.vwap_deviation_percent {
                let high = deviation >= self.config.vwap.max_deviation_percent;
                let low = deviation <= -self.config.vwap.max_deviation_percent;
                votes.push((weights.vwap_weight, signal_aware_pass(class, side, high, low)));
            }
        }
        if !weights.rsi_weight.is_zero() {
            if let Some(rsi) = readings.rsi {
                let high = rsi >= self.config.rsi.overbought;
                let low = rsi <= self.config.rsi.oversold;
                votes.push((weights.rsi_weight, signal_aware_pass(class, side, high, low)));
            }
        }
        if !weights.oir_weight.is_zero() {
            if let Some(oir) = readings.oir {
                let high = oir >= self.config.oir.high_threshold;
                let low = oir <= self.config.oir.low_threshold;
                votes.push((weights.oir_weight, signal_aware_pass(class, side, high, low)));
            }
        }

        if votes.is_empty() {
            return true;
        }

        match self.config.filter_strength.combination_mode {
            CombinationMode::All => votes.iter().all(|(_, pass)| *pass),
            CombinationMode::Any => votes.iter().any(|(_, pass)| *pass),
            CombinationMode::Majority => {
                let total_weight: Decimal = votes.iter().map(|(w, _)| *w).sum();
                if total_weight.is_zero() {
                    return true;
                }
                let passing_weight: Decimal = votes
                    .iter()
                    .filter(|(_, pass)| *pass)
                    .map(|(w, _)| *w)
                    .sum();
                passing_weight / total_weight >= Decimal::new(5, 1)
            }
        }
    }
}

/// Signal-type-aware pass/filter decision shared by VWAP deviation, RSI,
/// and OIR: a `Trend` candidate filters on either extreme (an exhausted
/// move threatens continuation in any direction); a `Reversal` candidate
/// filters only on the extreme opposite its side (the matching extreme is
/// the confirmation the reversal thesis needs).
fn signal_aware_pass(class: FilterClass, side: Side, extreme_high: bool, extreme_low: bool) -> bool {
    match class {
        FilterClass::Trend => !(extreme_high || extreme_low),
        FilterClass::Reversal => match side {
            Side::Buy => !extreme_high,
            Side::Sell => !extreme_low,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterStrengthConfig, OirFilterConfig, RsiFilterConfig, VwapFilterConfig};
    use rust_decimal_macros::dec;

    fn config() -> IndicatorsConfig {
        IndicatorsConfig {
            enabled: true,
            vwap: VwapFilterConfig {
                window_ms: 900_000,
                max_deviation_percent: dec!(1.5),
            },
            rsi: RsiFilterConfig {
                period: 3,
                overbought: dec!(70),
                oversold: dec!(30),
            },
            oir: OirFilterConfig {
                window_ms: 300_000,
                high_threshold: dec!(0.65),
                low_threshold: dec!(0.35),
                min_volume_threshold: dec!(10),
            },
            filter_strength: FilterStrengthConfig {
                vwap_weight: dec!(0),
                rsi_weight: dec!(1),
                oir_weight: dec!(0),
                combination_mode: CombinationMode::All,
            },
        }
    }

    #[test]
    fn rsi_seeds_after_period_then_smooths() {
        let mut rsi = RsiTracker::new(3);
        assert_eq!(rsi.rsi(), None);
        for p in [dec!(10), dec!(11), dec!(12), dec!(13)] {
            rsi.push(p);
        }
        assert!(rsi.rsi().is_some());
    }

    #[test]
    fn rsi_zero_avg_loss_with_gain_is_exactly_100() {
        let mut rsi = RsiTracker::new(2);
        rsi.push(dec!(10));
        rsi.push(dec!(11));
        rsi.push(dec!(12));
        assert_eq!(rsi.rsi(), Some(dec!(100)));
    }

    #[test]
    fn rsi_both_zero_is_50() {
        let mut rsi = RsiTracker::new(2);
        rsi.push(dec!(10));
        rsi.push(dec!(10));
        rsi.push(dec!(10));
        assert_eq!(rsi.rsi(), Some(dec!(50)));
    }

    #[test]
    fn oir_below_min_volume_is_undefined() {
        let mut oir = OirTracker::new(60_000, dec!(100), 16);
        oir.push(Sample {
            timestamp: 0,
            price: dec!(1),
            quantity: dec!(5),
            aggressor: AggressorSide::Buy,
        });
        assert_eq!(oir.oir(), None);
    }

    #[test]
    fn reversal_buy_passes_at_oversold_filters_at_overbought() {
        assert!(signal_aware_pass(FilterClass::Reversal, Side::Buy, false, true));
        assert!(!signal_aware_pass(FilterClass::Reversal, Side::Buy, true, false));
    }

    #[test]
    fn trend_buy_filters_at_either_extreme() {
        assert!(!signal_aware_pass(FilterClass::Trend, Side::Buy, true, false));
        assert!(!signal_aware_pass(FilterClass::Trend, Side::Buy, false, true));
        assert!(signal_aware_pass(FilterClass::Trend, Side::Buy, false, false));
    }

    #[test]
    fn disabled_indicators_always_pass() {
        let mut cfg = config();
        cfg.enabled = false;
        let indicators = TraditionalIndicators::new(cfg);
        assert!(indicators.passes(FilterClass::Reversal, Side::Buy, dec!(100)));
    }

    #[test]
    fn rsi_only_filter_blocks_overbought_buy_reversal() {
        let mut indicators = TraditionalIndicators::new(config());
        for p in [dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)] {
            indicators.update(0, p, dec!(1), AggressorSide::Buy);
        }
        assert!(!indicators.passes(FilterClass::Reversal, Side::Buy, dec!(50)));
    }
}
