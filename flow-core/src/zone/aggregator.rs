//! Per-symbol, multi-resolution time-windowed zone tracking.
//!
//! Exclusively owned by [`crate::preprocessor::Preprocessor`]; detectors
//! only ever see the [`crate::model::ZoneSnapshot`] values handed to them
//! inside an [`crate::model::EnrichedTrade`].

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::financial_math::align_to_tick;
use crate::model::{
    AggressorSide, PassiveLiquidity, ResolutionZones, StandardZoneData, TimestampMs,
    ZoneBoundaries, ZoneConfig, ZoneId, ZoneSnapshot, ZoneTradeEntry,
};
use crate::ring_buffer::CircularBuffer;

/// Per-resolution tuning beyond the price geometry carried in
/// [`ZoneConfig`]: how many distinct zones to retain, how long an
/// untouched zone survives, and how far from the current price a zone is
/// still reported.
#[derive(Debug, Clone, Copy)]
pub struct ZoneResolutionConfig {
    pub zone: ZoneConfig,
    pub zone_cache_size: usize,
    pub max_zone_cache_age_ms: i64,
    pub zone_calculation_range_ticks: u32,
    pub trade_history_capacity: usize,
}

/// Narrow query the aggregator issues once per zone on every update: the
/// resting liquidity on each side of the book within a price range. Kept
/// separate from [`crate::preprocessor::OrderBookSnapshotSource`] (which
/// also answers best-bid/ask for a symbol) since the aggregator itself
/// has no notion of "symbol" — it is instantiated one per symbol already.
pub trait ZoneLiquiditySource {
    fn passive_liquidity(&self, lo: Decimal, hi: Decimal) -> PassiveLiquidity;
}

struct TrackedZoneState {
    history: CircularBuffer<ZoneTradeEntry>,
    last_update: TimestampMs,
    passive: PassiveLiquidity,
}

struct ResolutionState {
    config: ZoneResolutionConfig,
    zones: HashMap<ZoneId, TrackedZoneState>,
}

/// Maintains one [`HashMap<ZoneId, _>`] per configured resolution and
/// recomputes aggregates from each zone's bounded trade history on every
/// update — never cumulative accounting (§3 invariant).
pub struct ZoneAggregator {
    resolutions: Vec<ResolutionState>,
}

impl ZoneAggregator {
    pub fn new(configs: Vec<ZoneResolutionConfig>) -> Self {
        Self {
            resolutions: configs
                .into_iter()
                .map(|config| ResolutionState {
                    config,
                    zones: HashMap::new(),
                })
                .collect(),
        }
    }

    /// Applies one trade to every configured resolution (update protocol
    /// steps a-e) and returns the zone snapshots within
    /// `zone_calculation_range_ticks` of `price` at every resolution.
    ///
    /// The trade that triggered this call is folded into its zone's
    /// history *before* the returned snapshots are built, so the zones
    /// handed back to the caller already reflect it — the critical
    /// ordering rule that fixes the off-by-one class of bug where a
    /// zone's own triggering trade appeared absent from it.
    pub fn update(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        timestamp: TimestampMs,
        aggressor: AggressorSide,
        liquidity: &dyn ZoneLiquiditySource,
    ) -> StandardZoneData {
        let mut out = StandardZoneData::default();
        for res in &mut self.resolutions {
            let zone_id = Self::compute_zone_id(price, res.config.zone);
            let boundaries = Self::boundaries_for(zone_id, res.config.zone);

            let entry = res.zones.entry(zone_id).or_insert_with(|| TrackedZoneState {
                history: CircularBuffer::new(res.config.trade_history_capacity),
                last_update: timestamp,
                passive: PassiveLiquidity::default(),
            });
            entry.history.push(ZoneTradeEntry {
                price,
                quantity,
                timestamp,
                aggressor,
            });
            let cutoff = timestamp - res.config.zone.time_window_ms;
            entry.history.retain(|e| e.timestamp >= cutoff);
            entry.last_update = timestamp;
            entry.passive = liquidity.passive_liquidity(boundaries.min, boundaries.max);

            Self::evict(res, timestamp);

            let zones = Self::snapshots_in_range(res, price);
            out.resolutions.push(ResolutionZones {
                config: res.config.zone,
                zones,
            });
        }
        out
    }

    fn compute_zone_id(price: Decimal, config: ZoneConfig) -> ZoneId {
        let aligned = align_to_tick(price, config.zone_width());
        ZoneId {
            price_level: aligned,
            zone_ticks: config.zone_ticks,
        }
    }

    fn boundaries_for(zone_id: ZoneId, config: ZoneConfig) -> ZoneBoundaries {
        ZoneBoundaries {
            min: zone_id.price_level,
            max: zone_id.price_level + config.zone_width(),
        }
    }

    /// Drops zones untouched for longer than `max_zone_cache_age_ms`, then
    /// LRU-evicts by `last_update` down to `zone_cache_size` if still over
    /// capacity.
    fn evict(res: &mut ResolutionState, now: TimestampMs) {
        let max_age = res.config.max_zone_cache_age_ms;
        res.zones.retain(|_, z| now - z.last_update <= max_age);

        let cap = res.config.zone_cache_size;
        if res.zones.len() > cap {
            let mut by_age: Vec<(ZoneId, TimestampMs)> = res
                .zones
                .iter()
                .map(|(id, z)| (*id, z.last_update))
                .collect();
            by_age.sort_by_key(|(_, ts)| *ts);
            let evict_count = by_age.len() - cap;
            for (id, _) in by_age.into_iter().take(evict_count) {
                res.zones.remove(&id);
            }
        }
    }

    fn snapshots_in_range(res: &ResolutionState, price: Decimal) -> Vec<ZoneSnapshot> {
        let range = res.config.zone.tick_value * Decimal::from(res.config.zone_calculation_range_ticks);
        let lo = price - range;
        let hi = price + range;

        let mut out: Vec<ZoneSnapshot> = res
            .zones
            .iter()
            .filter(|(id, z)| !z.history.is_empty() && id.price_level >= lo && id.price_level <= hi)
            .map(|(id, z)| Self::build_snapshot(*id, res.config.zone, z))
            .collect();
        out.sort_by(|a, b| a.price_level.cmp(&b.price_level));
        out
    }

    fn build_snapshot(zone_id: ZoneId, config: ZoneConfig, state: &TrackedZoneState) -> ZoneSnapshot {
        let mut aggressive_buy = Decimal::ZERO;
        let mut aggressive_sell = Decimal::ZERO;
        let mut notional = Decimal::ZERO;
        let mut volume = Decimal::ZERO;
        let mut trade_count: u32 = 0;
        let mut first_ts: Option<TimestampMs> = None;
        let mut last_ts: TimestampMs = 0;

        for entry in state.history.iter() {
            match entry.aggressor {
                AggressorSide::Buy => aggressive_buy += entry.quantity,
                AggressorSide::Sell => aggressive_sell += entry.quantity,
            }
            notional += entry.price * entry.quantity;
            volume += entry.quantity;
            trade_count += 1;
            first_ts.get_or_insert(entry.timestamp);
            last_ts = entry.timestamp;
        }

        let vwap = if volume.is_zero() {
            zone_id.price_level
        } else {
            notional / volume
        };
        let timespan = first_ts.map(|f| last_ts - f).unwrap_or(0);
        let boundaries = Self::boundaries_for(zone_id, config);

        ZoneSnapshot {
            zone_id,
            price_level: zone_id.price_level,
            boundaries,
            tick_size: config.tick_value,
            volume_weighted_price: vwap,
            aggressive_volume: aggressive_buy + aggressive_sell,
            aggressive_buy_volume: aggressive_buy,
            aggressive_sell_volume: aggressive_sell,
            passive_volume: state.passive.total(),
            passive_bid_volume: state.passive.bid_volume,
            passive_ask_volume: state.passive.ask_volume,
            trade_count,
            timespan_ms: timespan,
            last_update: state.last_update,
            trade_history: state.history.clone(),
        }
    }
}
