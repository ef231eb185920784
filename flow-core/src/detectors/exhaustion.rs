//! Detects depletion of passive liquidity on the side being hit, a
//! continuation signal that mirrors the aggressor direction (§4.6).
//!
//! The contrast with [`super::absorption`] is directional framing, not
//! mechanism: absorption asks whether the passive side *holds*, exhaustion
//! asks whether it *yields*. Both read the same directional passive
//! quantity off a [`crate::model::ZoneSnapshot`]; exhaustion additionally
//! tracks each zone's historical peak liquidity to compute how much of it
//! has been drained.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::config::ExhaustionConfig;
use crate::financial_math::divide_quantities;
use crate::model::{
    AggressorSide, EnrichedTrade, SignalCandidate, SignalCandidateData, SignalType, Side,
    TimestampMs, ZoneId,
};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};

use super::shared::build_candidate;
use super::{Detector, DetectorStatus};

/// Per-zone high-water mark for the side currently being hit, used to
/// compute `depletionFactor = 1 - (current / max_seen)` (§4.6 step 1).
struct ZoneLiquidityMemory {
    max_liquidity: Decimal,
    last_update: TimestampMs,
}

pub struct ExhaustionDetector {
    config: ExhaustionConfig,
    memory: HashMap<ZoneId, ZoneLiquidityMemory>,
    circuit: CircuitBreaker,
}

impl ExhaustionDetector {
    pub fn new(config: ExhaustionConfig) -> Self {
        let circuit = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_max_errors,
            failure_window: Duration::from_millis(config.circuit_breaker_window_ms),
            timeout: Duration::from_millis(config.circuit_breaker_window_ms),
            success_threshold: 1,
        });
        Self {
            config,
            memory: HashMap::new(),
            circuit,
        }
    }

    /// The side depleted by an aggressor: a buy aggressor hits the ask, a
    /// sell aggressor hits the bid.
    fn depleted_side_liquidity(aggressor: AggressorSide, zone: &crate::model::ZoneSnapshot) -> Decimal {
        match aggressor {
            AggressorSide::Buy => zone.passive_ask_volume,
            AggressorSide::Sell => zone.passive_bid_volume,
        }
    }

    /// Exhaustion continues the move: a buy aggressor depleting the ask
    /// predicts further upside (`buy`); a sell aggressor depleting the bid
    /// predicts further downside (`sell`) (§4.6 step 4, §9 open question
    /// resolved in favor of continuation).
    fn candidate_side(aggressor: AggressorSide) -> Side {
        match aggressor {
            AggressorSide::Buy => Side::Buy,
            AggressorSide::Sell => Side::Sell,
        }
    }

    fn evict_stale(&mut self, now: TimestampMs) {
        let limit = self.config.zone_age_limit_ms;
        self.memory.retain(|_, m| now - m.last_update <= limit);
        if self.memory.len() > self.config.max_zones {
            let mut by_age: Vec<(ZoneId, TimestampMs)> = self
                .memory
                .iter()
                .map(|(id, m)| (*id, m.last_update))
                .collect();
            by_age.sort_by_key(|(_, ts)| *ts);
            let evict_count = by_age.len() - self.config.max_zones;
            for (id, _) in by_age.into_iter().take(evict_count) {
                self.memory.remove(&id);
            }
        }
    }
}

impl Detector for ExhaustionDetector {
    fn on_enriched_trade(&mut self, trade: &EnrichedTrade) -> Option<SignalCandidate> {
        if !self.circuit.is_call_permitted() {
            return None;
        }

        let result = (|| -> Option<SignalCandidate> {
            let base_ticks = trade
                .zone_data
                .base_resolution()
                .map(|r| r.config.zone_ticks)?;
            let zone = trade.zone_data.zone_at(base_ticks, trade.price)?;

            if zone.aggressive_volume < self.config.min_agg_volume {
                return None;
            }

            let current_liquidity = Self::depleted_side_liquidity(trade.aggressor, zone);
            let memory = self
                .memory
                .entry(zone.zone_id)
                .or_insert_with(|| ZoneLiquidityMemory {
                    max_liquidity: current_liquidity,
                    last_update: trade.timestamp,
                });
            if current_liquidity > memory.max_liquidity {
                memory.max_liquidity = current_liquidity;
            }
            memory.last_update = trade.timestamp;
            let max_liquidity = memory.max_liquidity;

            let depletion_factor = if max_liquidity.is_zero() {
                Decimal::ZERO
            } else {
                Decimal::ONE - (current_liquidity / max_liquidity)
            };
            if depletion_factor < self.config.min_depletion_factor {
                return None;
            }

            let depletion_ratio = divide_quantities(
                max_liquidity - current_liquidity,
                max_liquidity,
            )
            .unwrap_or(Decimal::ZERO);
            if depletion_ratio < self.config.depletion_ratio_threshold
                || zone.aggressive_volume < self.config.depletion_volume_threshold
            {
                return None;
            }

            let mut confidence = self.config.base_confidence;
            confidence = confidence
                + (depletion_ratio - self.config.depletion_ratio_threshold).max(Decimal::ZERO) * Decimal::new(2, 1);

            self.evict_stale(trade.timestamp);

            Some(build_candidate(
                SignalType::Exhaustion,
                &trade.symbol,
                trade.price,
                confidence,
                trade.timestamp,
                SignalCandidateData::Exhaustion {
                    depletion_factor,
                    depletion_ratio,
                    aggressive_volume: zone.aggressive_volume,
                },
            ))
        })();

        self.circuit.record_success();
        result.map(|mut candidate| {
            candidate.side = Self::candidate_side(trade.aggressor);
            candidate
        })
    }

    fn mark_signal_confirmed(&mut self, price: Decimal, _side: Side) {
        self.memory.retain(|id, _| id.price_level != price);
    }

    fn status(&self) -> DetectorStatus {
        DetectorStatus {
            tracked_zones: self.memory.len(),
            circuit_open: self.circuit.state() == crate::resilience::CircuitState::Open,
        }
    }

    fn name(&self) -> &'static str {
        "exhaustion"
    }
}

/// Registers one analysis failure with the detector's circuit breaker.
/// Called by the pipeline boundary that catches a panic or propagated
/// [`crate::error::DetectorError`] from this detector (§4.6 step 5, §7
/// DetectorInternal class).
pub fn record_analysis_error(detector: &mut ExhaustionDetector) {
    detector.circuit.record_failure();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AggressorSide, ResolutionZones, StandardZoneData, ZoneBoundaries, ZoneConfig, ZoneId,
        ZoneSnapshot,
    };
    use crate::ring_buffer::CircularBuffer;
    use rust_decimal_macros::dec;

    fn config() -> ExhaustionConfig {
        ExhaustionConfig {
            min_agg_volume: dec!(10),
            min_depletion_factor: dec!(0.4),
            depletion_ratio_threshold: dec!(0.5),
            depletion_volume_threshold: dec!(10),
            base_confidence: dec!(0.4),
            max_zones: 64,
            zone_age_limit_ms: 3_600_000,
            circuit_breaker_max_errors: 5,
            circuit_breaker_window_ms: 60_000,
        }
    }

    fn zone(price: Decimal, aggressive_volume: Decimal, passive_ask: Decimal) -> ZoneSnapshot {
        ZoneSnapshot {
            zone_id: ZoneId {
                price_level: price,
                zone_ticks: 1,
            },
            price_level: price,
            boundaries: ZoneBoundaries {
                min: price,
                max: price + dec!(0.01),
            },
            tick_size: dec!(0.01),
            volume_weighted_price: price,
            aggressive_volume,
            aggressive_buy_volume: aggressive_volume,
            aggressive_sell_volume: Decimal::ZERO,
            passive_volume: passive_ask,
            passive_bid_volume: Decimal::ZERO,
            passive_ask_volume: passive_ask,
            trade_count: 1,
            timespan_ms: 0,
            last_update: 0,
            trade_history: CircularBuffer::new(4),
        }
    }

    fn trade(price: Decimal, timestamp: TimestampMs, z: ZoneSnapshot) -> EnrichedTrade {
        EnrichedTrade {
            symbol: "LTCUSDT".into(),
            price,
            quantity: dec!(10),
            timestamp,
            aggressor: AggressorSide::Buy,
            best_bid: Some(price - dec!(0.01)),
            best_ask: Some(price + dec!(0.01)),
            zone_data: StandardZoneData {
                resolutions: vec![ResolutionZones {
                    config: ZoneConfig {
                        tick_value: dec!(0.01),
                        zone_ticks: 1,
                        time_window_ms: 30_000,
                    },
                    zones: vec![z],
                }],
            },
        }
    }

    #[test]
    fn depletion_builds_confidence_and_continuation_side() {
        let mut detector = ExhaustionDetector::new(config());

        let t1 = trade(dec!(110.00), 0, zone(dec!(110.00), dec!(15), dec!(100)));
        assert!(detector.on_enriched_trade(&t1).is_none());

        let t2 = trade(dec!(110.00), 1_000, zone(dec!(110.00), dec!(15), dec!(40)));
        let candidate = detector
            .on_enriched_trade(&t2)
            .expect("depletion should fire once liquidity has drained");
        assert_eq!(candidate.signal_type, SignalType::Exhaustion);
        assert_eq!(candidate.side, Side::Buy);
    }

    #[test]
    fn insufficient_depletion_is_rejected() {
        let mut detector = ExhaustionDetector::new(config());
        let t1 = trade(dec!(110.00), 0, zone(dec!(110.00), dec!(15), dec!(100)));
        detector.on_enriched_trade(&t1);
        let t2 = trade(dec!(110.00), 1_000, zone(dec!(110.00), dec!(15), dec!(95)));
        assert!(detector.on_enriched_trade(&t2).is_none());
    }

    #[test]
    fn circuit_breaker_blocks_after_threshold_failures() {
        let mut detector = ExhaustionDetector::new(config());
        for _ in 0..5 {
            record_analysis_error(&mut detector);
        }
        assert!(detector.status().circuit_open);
        let t = trade(dec!(110.00), 0, zone(dec!(110.00), dec!(15), dec!(40)));
        assert!(detector.on_enriched_trade(&t).is_none());
    }
}
