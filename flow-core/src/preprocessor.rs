//! Validates raw exchange events and enriches them with book context and
//! multi-resolution zone data (§4.4).

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::ZonesConfig;
use crate::error::PreprocessError;
use crate::financial_math::is_tick_aligned;
use crate::model::{
    AggTrade, AggressorSide, EnrichedTrade, ParsedTrade, PassiveLiquidity, TimestampMs,
};
use crate::zone::{ZoneAggregator, ZoneLiquiditySource, ZoneResolutionConfig};

/// Narrow query the preprocessor issues once per trade: the current
/// best bid/ask and the resting liquidity within a price range, both
/// answered by whatever maintains the live order book for this symbol.
pub trait OrderBookSnapshotSource {
    fn best_bid_ask(&self) -> (Option<Decimal>, Option<Decimal>);
    fn passive_liquidity(&self, lo: Decimal, hi: Decimal) -> PassiveLiquidity;
}

/// Adapts an [`OrderBookSnapshotSource`] to the narrower
/// [`ZoneLiquiditySource`] the aggregator itself needs, so the aggregator
/// stays ignorant of best-bid/ask entirely.
struct BookAdapter<'a>(&'a dyn OrderBookSnapshotSource);

impl ZoneLiquiditySource for BookAdapter<'_> {
    fn passive_liquidity(&self, lo: Decimal, hi: Decimal) -> PassiveLiquidity {
        self.0.passive_liquidity(lo, hi)
    }
}

/// Parses, validates, and enriches raw [`AggTrade`]s for one symbol.
///
/// Owns the symbol's [`ZoneAggregator`] exclusively; nothing downstream
/// touches zone state directly, only the [`crate::model::ZoneSnapshot`]
/// values carried inside the [`EnrichedTrade`]s this emits.
pub struct Preprocessor {
    symbol: String,
    tick_size: Decimal,
    zones: ZoneAggregator,
}

impl Preprocessor {
    pub fn new(symbol: String, tick_size: Decimal, zones_config: &ZonesConfig) -> Self {
        let resolutions = zones_config
            .resolutions
            .iter()
            .map(|r| ZoneResolutionConfig {
                zone: crate::model::ZoneConfig {
                    tick_value: tick_size,
                    zone_ticks: r.zone_ticks,
                    time_window_ms: r.time_window_ms,
                },
                zone_cache_size: r.zone_cache_size,
                max_zone_cache_age_ms: r.max_zone_cache_age_ms,
                zone_calculation_range_ticks: zones_config.zone_calculation_range_ticks,
                trade_history_capacity: zones_config.trade_history_capacity,
            })
            .collect();

        Self {
            symbol,
            tick_size,
            zones: ZoneAggregator::new(resolutions),
        }
    }

    /// Validates and parses a raw [`AggTrade`] per §4.4 step 1: quantity
    /// must be positive, price must parse and be tick-aligned.
    pub fn parse_trade(&self, trade: &AggTrade) -> Result<ParsedTrade, PreprocessError> {
        let price = trade
            .price
            .parse::<Decimal>()
            .map_err(|_| PreprocessError::DecimalParse {
                field: "price",
                value: trade.price.clone(),
            })?;
        let quantity =
            trade
                .quantity
                .parse::<Decimal>()
                .map_err(|_| PreprocessError::DecimalParse {
                    field: "quantity",
                    value: trade.quantity.clone(),
                })?;

        if quantity <= Decimal::ZERO {
            return Err(PreprocessError::InvalidQuantity {
                quantity: quantity.to_string(),
            });
        }
        if !is_tick_aligned(price, self.tick_size) {
            return Err(PreprocessError::UnalignedPrice {
                price: price.to_string(),
                tick_size: self.tick_size.to_string(),
            });
        }

        Ok(ParsedTrade {
            price,
            quantity,
            timestamp: trade.trade_time,
            aggressor: AggressorSide::from_buyer_is_maker(trade.buyer_is_maker),
        })
    }

    /// Runs one validated trade through zone aggregation and assembles the
    /// [`EnrichedTrade`] published to every detector, in the same order the
    /// underlying `AggTrade`s were received (§4.4 steps 2-4).
    pub fn enrich(
        &mut self,
        parsed: ParsedTrade,
        book: &dyn OrderBookSnapshotSource,
    ) -> EnrichedTrade {
        let adapter = BookAdapter(book);
        let zone_data = self.zones.update(
            parsed.price,
            parsed.quantity,
            parsed.timestamp,
            parsed.aggressor,
            &adapter,
        );
        let (best_bid, best_ask) = book.best_bid_ask();

        debug!(
            symbol = %self.symbol,
            price = %parsed.price,
            quantity = %parsed.quantity,
            "enriched trade"
        );

        EnrichedTrade {
            symbol: self.symbol.clone(),
            price: parsed.price,
            quantity: parsed.quantity,
            timestamp: parsed.timestamp,
            aggressor: parsed.aggressor,
            best_bid,
            best_ask,
            zone_data,
        }
    }

    /// Full pipeline entry point: validates and enriches a raw `AggTrade`
    /// in one call, logging and returning the classification error for
    /// any input the caller should drop and count rather than propagate
    /// (every [`PreprocessError`] variant is `InvalidInput` class).
    pub fn process(
        &mut self,
        trade: &AggTrade,
        book: &dyn OrderBookSnapshotSource,
    ) -> Result<EnrichedTrade, PreprocessError> {
        let parsed = self.parse_trade(trade)?;
        Ok(self.enrich(parsed, book))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// Logs and discards an invalid trade at the pipeline boundary (§4.4,
/// §7 InvalidInput class): never propagated, never counted as fatal.
pub fn log_invalid_trade(symbol: &str, error: &PreprocessError, timestamp: TimestampMs) {
    warn!(symbol, timestamp, error = %error, "dropping invalid trade");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneResolutionSpec;
    use rust_decimal_macros::dec;

    struct EmptyBook;
    impl OrderBookSnapshotSource for EmptyBook {
        fn best_bid_ask(&self) -> (Option<Decimal>, Option<Decimal>) {
            (Some(dec!(99.99)), Some(dec!(100.01)))
        }
        fn passive_liquidity(&self, _lo: Decimal, _hi: Decimal) -> PassiveLiquidity {
            PassiveLiquidity {
                bid_volume: dec!(50),
                ask_volume: dec!(80),
            }
        }
    }

    fn zones_config() -> ZonesConfig {
        ZonesConfig {
            resolutions: vec![ZoneResolutionSpec {
                zone_ticks: 1,
                time_window_ms: 30_000,
                zone_cache_size: 100,
                max_zone_cache_age_ms: 3_600_000,
            }],
            zone_calculation_range_ticks: 50,
            trade_history_capacity: 256,
        }
    }

    fn sample_trade() -> AggTrade {
        AggTrade {
            event_time: 1_000,
            symbol: "LTCUSDT".into(),
            agg_trade_id: 1,
            price: "100.00".into(),
            quantity: "10".into(),
            first_trade_id: 1,
            last_trade_id: 1,
            trade_time: 1_000,
            buyer_is_maker: false,
        }
    }

    #[test]
    fn valid_trade_produces_enriched_trade_with_zone_data() {
        let mut pp = Preprocessor::new("LTCUSDT".into(), dec!(0.01), &zones_config());
        let trade = sample_trade();
        let book = EmptyBook;
        let enriched = pp.process(&trade, &book).unwrap();

        assert_eq!(enriched.symbol, "LTCUSDT");
        assert_eq!(enriched.price, dec!(100.00));
        assert_eq!(enriched.aggressor, AggressorSide::Buy);
        assert_eq!(enriched.best_bid, Some(dec!(99.99)));
        let zone = enriched.zone_data.zone_at(1, dec!(100.00)).unwrap();
        assert_eq!(zone.aggressive_volume, dec!(10));
        assert_eq!(zone.passive_ask_volume, dec!(80));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let pp = Preprocessor::new("LTCUSDT".into(), dec!(0.01), &zones_config());
        let mut trade = sample_trade();
        trade.quantity = "0".into();
        let err = pp.parse_trade(&trade).unwrap_err();
        assert!(matches!(err, PreprocessError::InvalidQuantity { .. }));
    }

    #[test]
    fn unaligned_price_is_rejected() {
        let pp = Preprocessor::new("LTCUSDT".into(), dec!(0.01), &zones_config());
        let mut trade = sample_trade();
        trade.price = "100.005".into();
        let err = pp.parse_trade(&trade).unwrap_err();
        assert!(matches!(err, PreprocessError::UnalignedPrice { .. }));
    }

    #[test]
    fn unparseable_decimal_is_rejected() {
        let pp = Preprocessor::new("LTCUSDT".into(), dec!(0.01), &zones_config());
        let mut trade = sample_trade();
        trade.price = "not-a-number".into();
        let err = pp.parse_trade(&trade).unwrap_err();
        assert!(matches!(err, PreprocessError::DecimalParse { field: "price", .. }));
    }

    #[test]
    fn buyer_is_maker_flag_maps_to_sell_aggressor() {
        let mut pp = Preprocessor::new("LTCUSDT".into(), dec!(0.01), &zones_config());
        let mut trade = sample_trade();
        trade.buyer_is_maker = true;
        let enriched = pp.process(&trade, &EmptyBook).unwrap();
        assert_eq!(enriched.aggressor, AggressorSide::Sell);
    }
}
