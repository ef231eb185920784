//! Detects aggressive volume absorbed by directional passive liquidity
//! without commensurate price movement (§4.5).

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::AbsorptionConfig;
use crate::financial_math::{calculate_abs, divide_quantities};
use crate::model::{
    AggressorSide, EnrichedTrade, SignalCandidate, SignalCandidateData, SignalType, Side,
    TimestampMs, ZoneId, ZoneSnapshot,
};

use super::shared::{build_candidate, clamp_confidence, cooldown_elapsed};
use super::{Detector, DetectorStatus};

/// Phase of the per-zone absorption state machine (§4.5 "State machine
/// per near-spread zone").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbsorptionPhase {
    Idle,
    Start,
    Progress,
    Complete,
}

struct TrackedZone {
    phase: AbsorptionPhase,
    peak_ratio: Decimal,
    last_event: Option<TimestampMs>,
    last_update: TimestampMs,
}

/// One evaluated timeframe's confluence contribution (§4.5 step 5).
struct ConfluenceReading {
    concurs: bool,
    strength: Decimal,
}

pub struct AbsorptionDetector {
    config: AbsorptionConfig,
    /// Zone-tick multiples to evaluate confluence over, e.g. `[1, 2, 4]`.
    zone_ticks: Vec<u32>,
    tracked: HashMap<(ZoneId, Side), TrackedZone>,
}

impl AbsorptionDetector {
    pub fn new(config: AbsorptionConfig, zone_ticks: Vec<u32>) -> Self {
        Self {
            config,
            zone_ticks,
            tracked: HashMap::new(),
        }
    }

    fn base_zone_ticks(&self) -> u32 {
        self.zone_ticks.iter().copied().min().unwrap_or(1)
    }

    /// The reversal side an absorption candidate carries: a buy aggressor
    /// being absorbed into the ask yields a `sell` candidate; a sell
    /// aggressor absorbed into the bid yields a `buy` candidate.
    fn candidate_side(aggressor: AggressorSide) -> Side {
        match aggressor {
            AggressorSide::Buy => Side::Sell,
            AggressorSide::Sell => Side::Buy,
        }
    }

    fn absorption_ratio(zone: &ZoneSnapshot, aggressor: AggressorSide) -> Option<Decimal> {
        let relevant_passive = zone.relevant_passive(aggressor);
        divide_quantities(relevant_passive, zone.aggressive_volume + relevant_passive)
    }

    fn evaluate_confluence(
        &self,
        trade: &EnrichedTrade,
        base_zone_id: ZoneId,
    ) -> Vec<ConfluenceReading> {
        self.zone_ticks
            .iter()
            .filter_map(|&ticks| {
                let zone = trade.zone_data.zone_at(ticks, trade.price)?;
                let ratio = Self::absorption_ratio(zone, trade.aggressor)?;
                let distance_ticks = if zone.tick_size.is_zero() {
                    0u32
                } else {
                    (calculate_abs(zone.price_level - base_zone_id.price_level) / zone.tick_size)
                        .round()
                        .to_string()
                        .parse()
                        .unwrap_or(u32::MAX)
                };
                let concurs = ratio >= self.config.passive_absorption_threshold
                    && distance_ticks <= self.config.max_zone_confluence_distance_ticks;

                let distance_score = if self.config.max_zone_confluence_distance_ticks == 0 {
                    Decimal::ZERO
                } else {
                    Decimal::ONE
                        - Decimal::from(distance_ticks.min(self.config.max_zone_confluence_distance_ticks))
                            / Decimal::from(self.config.max_zone_confluence_distance_ticks)
                };
                let volume_score = if zone.aggressive_volume.is_zero() {
                    Decimal::ZERO
                } else {
                    Decimal::ONE.min(zone.aggressive_volume / self.config.min_agg_volume)
                };
                let strength = self.config.confluence_distance_weight * distance_score
                    + self.config.confluence_volume_weight * volume_score
                    + self.config.confluence_ratio_weight * ratio;

                Some(ConfluenceReading { concurs, strength })
            })
            .collect()
    }

    fn advance_phase(&mut self, key: (ZoneId, Side), ratio: Decimal, now: TimestampMs) -> AbsorptionPhase {
        let threshold = self.config.passive_absorption_threshold;
        let entry = self.tracked.entry(key).or_insert(TrackedZone {
            phase: AbsorptionPhase::Idle,
            peak_ratio: Decimal::ZERO,
            last_event: None,
            last_update: now,
        });
        entry.last_update = now;

        entry.phase = match entry.phase {
            AbsorptionPhase::Idle => {
                if ratio >= threshold {
                    entry.peak_ratio = ratio;
                    AbsorptionPhase::Start
                } else {
                    AbsorptionPhase::Idle
                }
            }
            AbsorptionPhase::Start | AbsorptionPhase::Progress => {
                if ratio >= threshold {
                    if ratio > entry.peak_ratio {
                        entry.peak_ratio = ratio;
                    }
                    AbsorptionPhase::Progress
                } else if entry.peak_ratio - ratio <= threshold * Decimal::new(2, 1) {
                    AbsorptionPhase::Complete
                } else {
                    AbsorptionPhase::Idle
                }
            }
            AbsorptionPhase::Complete => AbsorptionPhase::Idle,
        };

        self.evict_stale(now);
        entry_phase_snapshot(self, key)
    }

    fn evict_stale(&mut self, now: TimestampMs) {
        let cap = self.config.tracked_zone_cache_size;
        if self.tracked.len() <= cap {
            return;
        }
        let mut by_age: Vec<((ZoneId, Side), TimestampMs)> = self
            .tracked
            .iter()
            .map(|(k, v)| (*k, v.last_update))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        let evict_count = by_age.len() - cap;
        for (k, _) in by_age.into_iter().take(evict_count) {
            self.tracked.remove(&k);
        }
        let _ = now;
    }
}

fn entry_phase_snapshot(detector: &AbsorptionDetector, key: (ZoneId, Side)) -> AbsorptionPhase {
    detector
        .tracked
        .get(&key)
        .map(|z| z.phase)
        .unwrap_or(AbsorptionPhase::Idle)
}

impl Detector for AbsorptionDetector {
    fn on_enriched_trade(&mut self, trade: &EnrichedTrade) -> Option<SignalCandidate> {
        let base_ticks = self.base_zone_ticks();
        let zone = trade.zone_data.zone_at(base_ticks, trade.price)?;

        if zone.aggressive_volume < self.config.min_agg_volume {
            return None;
        }

        let relevant_passive = zone.relevant_passive(trade.aggressor);
        let absorption_ratio = Self::absorption_ratio(zone, trade.aggressor)?;
        if absorption_ratio < self.config.passive_absorption_threshold {
            return None;
        }

        let denominator = zone.aggressive_volume * self.config.expected_movement_scaling_factor;
        let price_efficiency = if denominator.is_zero() {
            Decimal::ZERO
        } else {
            calculate_abs(trade.price - zone.volume_weighted_price) / denominator
        };
        if price_efficiency > self.config.price_efficiency_threshold {
            return None;
        }

        let side = Self::candidate_side(trade.aggressor);
        let zone_id = zone.zone_id;
        let key = (zone_id, side);

        if !cooldown_elapsed(
            self.tracked.get(&key).and_then(|z| z.last_event),
            trade.timestamp,
            self.config.event_cooldown_ms,
        ) {
            return None;
        }

        let mut confidence = self.config.base_confidence;

        let confluence = self.evaluate_confluence(trade, zone_id);
        let confluence_count = confluence.iter().filter(|c| c.concurs).count() as u32;
        if confluence_count >= self.config.min_zone_confluence_count {
            confidence = clamp_confidence(confidence + self.config.confluence_confidence_boost);
        }

        let institutional = zone.aggressive_volume >= self.config.institutional_volume_threshold
            && absorption_ratio >= self.config.institutional_volume_ratio_threshold;
        if institutional {
            confidence = clamp_confidence(confidence + self.config.institutional_volume_boost);
        }

        confidence = clamp_confidence(confidence);
        if confidence < self.config.final_confidence_required {
            return None;
        }

        self.advance_phase(key, absorption_ratio, trade.timestamp);
        if let Some(tracked) = self.tracked.get_mut(&key) {
            tracked.last_event = Some(trade.timestamp);
        }

        let mut candidate = build_candidate(
            SignalType::Absorption,
            &trade.symbol,
            trade.price,
            confidence,
            trade.timestamp,
            SignalCandidateData::Absorption {
                absorption_ratio,
                price_efficiency,
                relevant_passive,
                aggressive_volume: zone.aggressive_volume,
                confluence_count,
                institutional,
            },
        );
        candidate.side = side;
        Some(candidate)
    }

    fn mark_signal_confirmed(&mut self, price: Decimal, side: Side) {
        for (key, zone) in self.tracked.iter_mut() {
            if key.1 == side && key.0.price_level == price {
                zone.phase = AbsorptionPhase::Idle;
            }
        }
    }

    fn status(&self) -> DetectorStatus {
        DetectorStatus {
            tracked_zones: self.tracked.len(),
            circuit_open: false,
        }
    }

    fn name(&self) -> &'static str {
        "absorption"
    }
}
