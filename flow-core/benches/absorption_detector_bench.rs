//! Throughput of `AbsorptionDetector::on_enriched_trade`, the per-trade
//! hot path every detector shares the shape of.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use flow_core::config::AbsorptionConfig;
use flow_core::detectors::{AbsorptionDetector, Detector};
use flow_core::model::{
    AggressorSide, EnrichedTrade, ResolutionZones, StandardZoneData, TimestampMs, ZoneBoundaries,
    ZoneConfig, ZoneId, ZoneSnapshot,
};
use flow_core::ring_buffer::CircularBuffer;

fn config() -> AbsorptionConfig {
    AbsorptionConfig {
        min_agg_volume: dec!(20),
        passive_absorption_threshold: dec!(0.65),
        price_efficiency_threshold: dec!(0.3),
        expected_movement_scaling_factor: dec!(1),
        event_cooldown_ms: 5_000,
        final_confidence_required: dec!(0.3),
        base_confidence: dec!(0.5),
        confluence_confidence_boost: dec!(0.1),
        min_zone_confluence_count: 2,
        max_zone_confluence_distance_ticks: 3,
        confluence_distance_weight: dec!(0.3),
        confluence_volume_weight: dec!(0.3),
        confluence_ratio_weight: dec!(0.4),
        institutional_volume_threshold: dec!(200),
        institutional_volume_ratio_threshold: dec!(0.8),
        institutional_volume_boost: dec!(0.15),
        tracked_zone_cache_size: 512,
    }
}

fn zone(price: Decimal, aggressive_volume: Decimal, passive_bid: Decimal, passive_ask: Decimal) -> ZoneSnapshot {
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
        passive_volume: passive_bid + passive_ask,
        passive_bid_volume: passive_bid,
        passive_ask_volume: passive_ask,
        trade_count: 1,
        timespan_ms: 0,
        last_update: 0,
        trade_history: CircularBuffer::new(4),
    }
}

fn trade(price: Decimal, timestamp: TimestampMs) -> EnrichedTrade {
    EnrichedTrade {
        symbol: "LTCUSDT".into(),
        price,
        quantity: dec!(35),
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
                zones: vec![zone(price, dec!(30), dec!(5), dec!(60))],
            }],
        },
    }
}

fn bench_absorption_detector(c: &mut Criterion) {
    c.bench_function("absorption_detector_on_enriched_trade", |b| {
        let mut detector = AbsorptionDetector::new(config(), vec![1]);
        let mut ts: TimestampMs = 0;
        b.iter(|| {
            ts += 10_000;
            black_box(detector.on_enriched_trade(&trade(dec!(110.00), ts)));
        });
    });
}

criterion_group!(benches, bench_absorption_detector);
criterion_main!(benches);
