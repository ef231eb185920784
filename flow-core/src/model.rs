//! Core data model: inbound exchange events, the preprocessor's enriched
//! output, zone snapshots, and the signal types that flow from detectors
//! through the signal manager.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ring_buffer::CircularBuffer;

/// Milliseconds since the Unix epoch. A plain `i64` (not `u64`) so that
/// subtracting two timestamps to compute an age never wraps.
pub type TimestampMs = i64;

/// Which side of the trade was the aggressor (taker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggressorSide {
    Buy,
    Sell,
}

impl AggressorSide {
    /// Derives the aggressor side from the exchange's `buyerIsMaker` flag:
    /// when the buyer is the maker, the taker (aggressor) is the seller.
    pub fn from_buyer_is_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker {
            AggressorSide::Sell
        } else {
            AggressorSide::Buy
        }
    }

    /// The opposite side.
    pub fn opposite(self) -> Self {
        match self {
            AggressorSide::Buy => AggressorSide::Sell,
            AggressorSide::Sell => AggressorSide::Buy,
        }
    }
}

/// A trading side for a confirmed signal, distinct from [`AggressorSide`]
/// even though the variants read the same — kept as a separate type so a
/// detector's directional reasoning about *trades* is never silently
/// confused with a signal manager's directional conclusion about *trading
/// action*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Raw aggregated-trade event as delivered by the exchange client adapter.
/// Decimal fields arrive as strings and must be parsed with
/// `Decimal::from_str`, never `as f64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTrade {
    pub event_time: TimestampMs,
    pub symbol: String,
    pub agg_trade_id: u64,
    pub price: String,
    pub quantity: String,
    pub first_trade_id: u64,
    pub last_trade_id: u64,
    pub trade_time: TimestampMs,
    pub buyer_is_maker: bool,
}

/// One side of an order-book depth diff: `(price, quantity)`.
pub type DepthLevel = (Decimal, Decimal);

/// Raw order-book depth diff as delivered by the exchange client adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthDiff {
    pub event_time: TimestampMs,
    pub symbol: String,
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// A parsed, validated trade ready for zone aggregation. Produced by
/// [`crate::preprocessor::Preprocessor`] from an [`AggTrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTrade {
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: TimestampMs,
    pub aggressor: AggressorSide,
}

/// Passive liquidity available on each side of the book within a zone's
/// price range, as reported by the external order-book maintainer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassiveLiquidity {
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
}

impl PassiveLiquidity {
    pub fn total(&self) -> Decimal {
        self.bid_volume + self.ask_volume
    }
}

/// The tick/zone geometry shared by every resolution tracked for one
/// symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Base tick size (e.g. 0.01).
    pub tick_value: Decimal,
    /// Number of base ticks that make up one zone at this resolution
    /// (e.g. 1, 2, 4).
    pub zone_ticks: u32,
    /// Trailing time window, in milliseconds, over which this
    /// resolution's zone statistics are computed.
    pub time_window_ms: i64,
}

impl ZoneConfig {
    /// Full width of a zone at this resolution: `tick_value * zone_ticks`.
    pub fn zone_width(&self) -> Decimal {
        self.tick_value * Decimal::from(self.zone_ticks)
    }
}

/// A price boundary pair `[min, max)` for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneBoundaries {
    pub min: Decimal,
    pub max: Decimal,
}

/// One historical trade retained inside a zone's bounded history, used to
/// recompute aggregates after expiring entries older than the time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTradeEntry {
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: TimestampMs,
    pub aggressor: AggressorSide,
}

/// A stable identifier for a zone: its aligned lower boundary at a given
/// resolution. Two zones with the same price level at different
/// resolutions have different [`ZoneId`]s because `zone_ticks` differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId {
    pub price_level: Decimal,
    pub zone_ticks: u32,
}

/// A time-windowed volume profile for one price zone at one resolution.
///
/// Every volume field reflects only trades within
/// `[now - time_window, now]` — never cumulative accounting (§3 invariant).
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub zone_id: ZoneId,
    pub price_level: Decimal,
    pub boundaries: ZoneBoundaries,
    pub tick_size: Decimal,
    pub volume_weighted_price: Decimal,
    pub aggressive_volume: Decimal,
    pub aggressive_buy_volume: Decimal,
    pub aggressive_sell_volume: Decimal,
    pub passive_volume: Decimal,
    pub passive_bid_volume: Decimal,
    pub passive_ask_volume: Decimal,
    pub trade_count: u32,
    pub timespan_ms: i64,
    pub last_update: TimestampMs,
    pub trade_history: CircularBuffer<ZoneTradeEntry>,
}

impl ZoneSnapshot {
    /// Directionally-correct passive volume relevant to an absorption
    /// evaluation for the given aggressor side: a buy aggressor tests
    /// against ask-side passive liquidity, a sell aggressor against
    /// bid-side — using total passive volume here is the defect the spec
    /// explicitly calls out as a correctness fix.
    pub fn relevant_passive(&self, aggressor: AggressorSide) -> Decimal {
        match aggressor {
            AggressorSide::Buy => self.passive_ask_volume,
            AggressorSide::Sell => self.passive_bid_volume,
        }
    }
}

/// The full multi-resolution zone view attached to every
/// [`EnrichedTrade`]: one [`ZoneSnapshot`] list per configured resolution
/// (typically 1x/2x/4x base ticks), each with its own zone config.
#[derive(Debug, Clone, Default)]
pub struct StandardZoneData {
    pub resolutions: Vec<ResolutionZones>,
}

/// One resolution's worth of zone snapshots, e.g. all the 2x-tick zones
/// near the current price.
#[derive(Debug, Clone)]
pub struct ResolutionZones {
    pub config: ZoneConfig,
    pub zones: Vec<ZoneSnapshot>,
}

impl StandardZoneData {
    /// Finds the zone snapshot containing `price` at the resolution whose
    /// `zone_ticks` equals `zone_ticks`, if any.
    pub fn zone_at(&self, zone_ticks: u32, price: Decimal) -> Option<&ZoneSnapshot> {
        self.resolutions
            .iter()
            .find(|r| r.config.zone_ticks == zone_ticks)?
            .zones
            .iter()
            .find(|z| price >= z.boundaries.min && price < z.boundaries.max)
    }

    /// The finest (smallest `zone_ticks`) resolution's zones, conventionally
    /// the base 1x resolution.
    pub fn base_resolution(&self) -> Option<&ResolutionZones> {
        self.resolutions.iter().min_by_key(|r| r.config.zone_ticks)
    }
}

/// A trade enriched with book context and the multi-resolution zone view,
/// as published by [`crate::preprocessor::Preprocessor`] and consumed by
/// every detector, in the exact order the preprocessor consumed the
/// underlying `AggTrade`s.
#[derive(Debug, Clone)]
pub struct EnrichedTrade {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: TimestampMs,
    pub aggressor: AggressorSide,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub zone_data: StandardZoneData,
}

/// The four microstructure patterns this system detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Absorption,
    Exhaustion,
    Accumulation,
    Distribution,
}

impl SignalType {
    /// Maps a confirmed signal's detector type to a trading side, per
    /// §4.9 step 6: absorption/accumulation reverse into a buy-the-dip /
    /// already-buying posture (`Buy`); exhaustion/distribution continue
    /// into a sell posture (`Sell`).
    pub fn trading_side(self) -> Side {
        match self {
            SignalType::Absorption | SignalType::Accumulation => Side::Buy,
            SignalType::Exhaustion | SignalType::Distribution => Side::Sell,
        }
    }

    /// Whether this signal type is classified as a reversal pattern for
    /// the purposes of [`crate::indicators`]'s signal-type-aware filter
    /// semantics (absorption is the only reversal-classified detector in
    /// this system; exhaustion/accumulation/distribution are trend-classified).
    pub fn is_reversal(self) -> bool {
        matches!(self, SignalType::Absorption)
    }
}

/// A non-directional-yet classification used by [`crate::indicators`]
/// to decide whether extreme readings favor or filter a candidate,
/// independent of which concrete [`SignalType`] produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    /// `reversal` / `absorption_reversal` in the distilled spec's
    /// terminology: extreme readings are favorable and pass.
    Reversal,
    /// `trend` in the distilled spec's terminology: extreme readings are
    /// against and filter.
    Trend,
}

impl From<SignalType> for FilterClass {
    fn from(t: SignalType) -> Self {
        if t.is_reversal() {
            FilterClass::Reversal
        } else {
            FilterClass::Trend
        }
    }
}

/// A candidate signal produced by one detector, not yet confirmed.
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub id: u128,
    pub signal_type: SignalType,
    pub side: Side,
    pub confidence: Decimal,
    pub timestamp: TimestampMs,
    pub symbol: String,
    pub price: Decimal,
    pub data: SignalCandidateData,
}

/// Detector-specific metadata attached to a [`SignalCandidate`], kept
/// out-of-line from the common fields so adding a new detector never
/// touches the others' variants.
#[derive(Debug, Clone)]
pub enum SignalCandidateData {
    Absorption {
        absorption_ratio: Decimal,
        price_efficiency: Decimal,
        relevant_passive: Decimal,
        aggressive_volume: Decimal,
        confluence_count: u32,
        institutional: bool,
    },
    Exhaustion {
        depletion_factor: Decimal,
        depletion_ratio: Decimal,
        aggressive_volume: Decimal,
    },
    AccumulationDistribution {
        duration_ms: i64,
        dominant_ratio: Decimal,
        trade_count: u32,
        institutional_score: Decimal,
        lifecycle: ZoneLifecycleEvent,
    },
}

/// Lifecycle events emitted by the accumulation/distribution detector as a
/// zone transitions between states (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneLifecycleEvent {
    ZoneCreated,
    ZoneStrengthened,
    ZoneWeakened,
    ZoneCompleted,
    ZoneInvalidated,
}

/// Which detector instance produced a [`SignalCandidate`], and any
/// processing metadata added on the way to the signal manager.
#[derive(Debug, Clone)]
pub struct ProcessedSignal {
    pub candidate: SignalCandidate,
    pub detector_name: &'static str,
    pub received_at: TimestampMs,
}

/// Statistics about how many prior same-type, near-price signals were
/// found during correlation scoring (§4.9 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationStats {
    pub correlated_count: u32,
    pub strength: Decimal,
}

/// A frozen snapshot of the market-health context consulted during the
/// health gate (§4.9 step 1), carried forward onto the confirmed signal
/// for audit purposes.
#[derive(Debug, Clone)]
pub struct MarketHealthSnapshot {
    pub is_healthy: bool,
    pub recommendation: MarketRecommendation,
    pub highest_severity: AnomalySeverity,
}

/// A [`ProcessedSignal`] that has passed every gate in the signal manager's
/// pipeline, carrying correlation statistics, a frozen market-health
/// snapshot, and the final (confidence-boosted) confidence value.
#[derive(Debug, Clone)]
pub struct ConfirmedSignal {
    pub id: u128,
    pub signal_type: SignalType,
    pub side: Side,
    pub price: Decimal,
    pub confidence: Decimal,
    pub timestamp: TimestampMs,
    pub correlation: CorrelationStats,
    pub market_health: MarketHealthSnapshot,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub confirmations: Vec<u128>,
}

/// Why a [`ProcessedSignal`] was rejected instead of confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    UnhealthyMarket,
    LowConfidence,
    ProcessingError,
    Timeout,
    Duplicate,
}

/// Outcome of running one [`ProcessedSignal`] through the signal manager.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    Confirmed(ConfirmedSignal),
    Rejected {
        candidate_id: u128,
        reason: RejectionReason,
    },
}

/// Recommendation returned by the external anomaly detector's
/// `getMarketHealth()` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRecommendation {
    Continue,
    ReduceSize,
    ClosePositions,
    InsufficientData,
}

/// Severity scale for anomalies reported by the external anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalySeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// The full `getMarketHealth()` response contract (§6).
#[derive(Debug, Clone)]
pub struct MarketHealth {
    pub is_healthy: bool,
    pub recommendation: MarketRecommendation,
    pub highest_severity: AnomalySeverity,
    pub critical_issues: Vec<String>,
    pub recent_anomaly_types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn aggressor_side_from_buyer_is_maker() {
        assert_eq!(
            AggressorSide::from_buyer_is_maker(true),
            AggressorSide::Sell
        );
        assert_eq!(
            AggressorSide::from_buyer_is_maker(false),
            AggressorSide::Buy
        );
    }

    #[test]
    fn signal_type_trading_side_mapping() {
        assert_eq!(SignalType::Absorption.trading_side(), Side::Buy);
        assert_eq!(SignalType::Accumulation.trading_side(), Side::Buy);
        assert_eq!(SignalType::Exhaustion.trading_side(), Side::Sell);
        assert_eq!(SignalType::Distribution.trading_side(), Side::Sell);
    }

    #[test]
    fn relevant_passive_is_directional() {
        let snapshot = ZoneSnapshot {
            zone_id: ZoneId {
                price_level: dec!(100),
                zone_ticks: 1,
            },
            price_level: dec!(100),
            boundaries: ZoneBoundaries {
                min: dec!(100),
                max: dec!(100.01),
            },
            tick_size: dec!(0.01),
            volume_weighted_price: dec!(100),
            aggressive_volume: dec!(30),
            aggressive_buy_volume: dec!(30),
            aggressive_sell_volume: dec!(0),
            passive_volume: dec!(65),
            passive_bid_volume: dec!(5),
            passive_ask_volume: dec!(60),
            trade_count: 1,
            timespan_ms: 0,
            last_update: 0,
            trade_history: CircularBuffer::new(4),
        };
        assert_eq!(
            snapshot.relevant_passive(AggressorSide::Buy),
            dec!(60)
        );
        assert_eq!(
            snapshot.relevant_passive(AggressorSide::Sell),
            dec!(5)
        );
    }
}
