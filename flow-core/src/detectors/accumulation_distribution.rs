//! Detects sustained one-sided aggressive flow in a zone over a longer
//! window than absorption/exhaustion (§4.7).
//!
//! Accumulation and distribution are the same state machine parameterized
//! by which side's aggressive volume is "dominant" — a buy-dominant zone
//! promotes to accumulation, a sell-dominant zone to distribution. Two
//! [`AccumulationDistributionDetector`] instances, one per [`ZoneSide`],
//! share this one implementation rather than duplicating it as the
//! original's near-symmetric class pair did (§9 design note).

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::AccumulationDistributionConfig;
use crate::financial_math::{calculate_std_dev, divide_quantities};
use crate::model::{
    EnrichedTrade, SignalCandidate, SignalCandidateData, SignalType, Side, TimestampMs, ZoneId,
    ZoneLifecycleEvent,
};

use super::shared::build_candidate;
use super::{Detector, DetectorStatus};

/// Which aggressive-volume side this detector instance tracks as
/// "dominant": [`ZoneSide::Buy`] promotes to accumulation (reversal
/// higher), [`ZoneSide::Sell`] promotes to distribution (reversal lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSide {
    Buy,
    Sell,
}

impl ZoneSide {
    fn signal_type(self) -> SignalType {
        match self {
            ZoneSide::Buy => SignalType::Accumulation,
            ZoneSide::Sell => SignalType::Distribution,
        }
    }

    fn lifecycle_event(self, phase: CandidatePhase) -> ZoneLifecycleEvent {
        match phase {
            CandidatePhase::JustPromoted => ZoneLifecycleEvent::ZoneCreated,
            CandidatePhase::Strengthened => ZoneLifecycleEvent::ZoneStrengthened,
            CandidatePhase::Weakened => ZoneLifecycleEvent::ZoneWeakened,
            CandidatePhase::Completed => ZoneLifecycleEvent::ZoneCompleted,
            CandidatePhase::Invalidated => ZoneLifecycleEvent::ZoneInvalidated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidatePhase {
    JustPromoted,
    Strengthened,
    Weakened,
    Completed,
    Invalidated,
}

/// One candidate zone's running tally of same-direction flow, rebuilt from
/// each trade's own zone snapshot rather than re-deriving volumes from
/// scratch — the zone snapshot already carries the time-windowed
/// aggregates (§4.3), this only layers the "how long has this zone been
/// one-sided" duration and promotion state on top.
struct TrackedZone {
    first_seen: TimestampMs,
    last_update: TimestampMs,
    active: bool,
    last_strength: Decimal,
    prices_seen: Vec<Decimal>,
}

pub struct AccumulationDistributionDetector {
    config: AccumulationDistributionConfig,
    side: ZoneSide,
    zones: HashMap<ZoneId, TrackedZone>,
}

impl AccumulationDistributionDetector {
    pub fn new(config: AccumulationDistributionConfig, side: ZoneSide) -> Self {
        Self {
            config,
            side,
            zones: HashMap::new(),
        }
    }

    fn dominant_ratio(&self, zone: &crate::model::ZoneSnapshot) -> Option<Decimal> {
        let dominant = match self.side {
            ZoneSide::Buy => zone.aggressive_buy_volume,
            ZoneSide::Sell => zone.aggressive_sell_volume,
        };
        divide_quantities(dominant, zone.aggressive_volume)
    }

    /// Price stability: bounded maximum deviation from VWAP across every
    /// price seen while this zone has been tracked (§4.7 "price
    /// stability"). Returns `1.0` (maximally stable) for a single
    /// observation.
    fn stability_score(prices: &[Decimal], vwap: Decimal, max_deviation_percent: Decimal) -> Decimal {
        if prices.len() < 2 {
            return Decimal::ONE;
        }
        let Some(std_dev) = calculate_std_dev(prices) else {
            return Decimal::ONE;
        };
        if vwap.is_zero() {
            return Decimal::ZERO;
        }
        let deviation_percent = (std_dev / vwap) * Decimal::from(100);
        if max_deviation_percent.is_zero() {
            return Decimal::ZERO;
        }
        (Decimal::ONE - (deviation_percent / max_deviation_percent)).clamp(Decimal::ZERO, Decimal::ONE)
    }

    /// Composite institutional score combining ratio strength, trade
    /// count, and price stability into one `[0, 1]` figure (§4.7
    /// "institutional score").
    fn institutional_score(ratio: Decimal, trade_count: u32, stability: Decimal, min_trade_count: u32) -> Decimal {
        let count_score = if min_trade_count == 0 {
            Decimal::ONE
        } else {
            Decimal::ONE.min(Decimal::from(trade_count) / Decimal::from(min_trade_count))
        };
        ((ratio + count_score + stability) / Decimal::from(3)).clamp(Decimal::ZERO, Decimal::ONE)
    }

    fn evict_stale(&mut self, now: TimestampMs) {
        if self.zones.len() <= self.config.max_tracked_zones {
            return;
        }
        let mut by_age: Vec<(ZoneId, TimestampMs)> = self
            .zones
            .iter()
            .map(|(id, z)| (*id, z.last_update))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        let evict_count = by_age.len() - self.config.max_tracked_zones;
        for (id, _) in by_age.into_iter().take(evict_count) {
            self.zones.remove(&id);
        }
        let _ = now;
    }
}

impl Detector for AccumulationDistributionDetector {
    fn on_enriched_trade(&mut self, trade: &EnrichedTrade) -> Option<SignalCandidate> {
        let base_ticks = trade.zone_data.base_resolution()?.config.zone_ticks;
        let zone = trade.zone_data.zone_at(base_ticks, trade.price)?;

        let ratio = self.dominant_ratio(zone)?;
        let zone_id = zone.zone_id;

        if ratio < self.config.dominant_ratio_threshold {
            // Flow has turned two-sided; invalidate any tracked candidate
            // for this zone rather than letting it linger.
            if let Some(tracked) = self.zones.get_mut(&zone_id) {
                if tracked.active {
                    tracked.active = false;
                    return Some(build_candidate(
                        self.side.signal_type(),
                        &trade.symbol,
                        trade.price,
                        Decimal::ZERO,
                        trade.timestamp,
                        SignalCandidateData::AccumulationDistribution {
                            duration_ms: trade.timestamp - tracked.first_seen,
                            dominant_ratio: ratio,
                            trade_count: zone.trade_count,
                            institutional_score: Decimal::ZERO,
                            lifecycle: self.side.lifecycle_event(CandidatePhase::Invalidated),
                        },
                    ));
                }
            }
            return None;
        }

        let tracked = self.zones.entry(zone_id).or_insert_with(|| TrackedZone {
            first_seen: trade.timestamp,
            last_update: trade.timestamp,
            active: false,
            last_strength: Decimal::ZERO,
            prices_seen: Vec::new(),
        });
        tracked.last_update = trade.timestamp;
        tracked.prices_seen.push(trade.price);
        if tracked.prices_seen.len() > 256 {
            tracked.prices_seen.remove(0);
        }
        let duration_ms = trade.timestamp - tracked.first_seen;

        let stability = Self::stability_score(
            &tracked.prices_seen,
            zone.volume_weighted_price,
            self.config.max_price_deviation_percent,
        );
        let institutional_score = Self::institutional_score(
            ratio,
            zone.trade_count,
            stability,
            self.config.min_trade_count,
        );

        let meets_thresholds = duration_ms >= self.config.min_candidate_duration_ms
            && zone.trade_count >= self.config.min_trade_count
            && institutional_score >= self.config.min_institutional_score;

        if !meets_thresholds {
            self.evict_stale(trade.timestamp);
            return None;
        }

        let strength = (ratio + institutional_score) / Decimal::TWO;
        let was_active = tracked.active;
        let last_strength = tracked.last_strength;
        tracked.active = true;
        tracked.last_strength = strength;

        let phase = if !was_active {
            CandidatePhase::JustPromoted
        } else if strength - last_strength >= self.config.strength_change_threshold {
            CandidatePhase::Strengthened
        } else if last_strength - strength >= self.config.strength_change_threshold {
            CandidatePhase::Weakened
        } else {
            self.evict_stale(trade.timestamp);
            return None;
        };

        self.evict_stale(trade.timestamp);

        let confidence = (self.config.base_confidence + strength * Decimal::new(5, 1)).min(Decimal::ONE);

        Some(build_candidate(
            self.side.signal_type(),
            &trade.symbol,
            trade.price,
            confidence,
            trade.timestamp,
            SignalCandidateData::AccumulationDistribution {
                duration_ms,
                dominant_ratio: ratio,
                trade_count: zone.trade_count,
                institutional_score,
                lifecycle: self.side.lifecycle_event(phase),
            },
        ))
    }

    fn mark_signal_confirmed(&mut self, price: Decimal, _side: Side) {
        self.zones.retain(|id, _| id.price_level != price);
    }

    fn status(&self) -> DetectorStatus {
        DetectorStatus {
            tracked_zones: self.zones.len(),
            circuit_open: false,
        }
    }

    fn name(&self) -> &'static str {
        match self.side {
            ZoneSide::Buy => "accumulation",
            ZoneSide::Sell => "distribution",
        }
    }
}
