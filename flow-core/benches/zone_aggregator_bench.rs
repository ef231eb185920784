//! Throughput of the hot path every trade takes: `ZoneAggregator::update`
//! across a handful of realistic resolution configurations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use flow_core::model::{AggressorSide, PassiveLiquidity, ZoneConfig};
use flow_core::zone::{ZoneAggregator, ZoneLiquiditySource};

struct FixedLiquidity;

impl ZoneLiquiditySource for FixedLiquidity {
    fn passive_liquidity(&self, _lo: Decimal, _hi: Decimal) -> PassiveLiquidity {
        PassiveLiquidity {
            bid_volume: dec!(50),
            ask_volume: dec!(50),
        }
    }
}

fn resolutions() -> Vec<flow_core::zone::ZoneResolutionConfig> {
    [1u32, 2, 4]
        .into_iter()
        .map(|zone_ticks| flow_core::zone::ZoneResolutionConfig {
            zone: ZoneConfig {
                tick_value: dec!(0.01),
                zone_ticks,
                time_window_ms: 30_000,
            },
            zone_cache_size: 500,
            max_zone_cache_age_ms: 3_600_000,
            zone_calculation_range_ticks: 50,
            trade_history_capacity: 256,
        })
        .collect()
}

fn bench_zone_aggregator(c: &mut Criterion) {
    let liquidity = FixedLiquidity;

    c.bench_function("zone_aggregator_update_single_price", |b| {
        let mut aggregator = ZoneAggregator::new(resolutions());
        let mut ts = 0i64;
        b.iter(|| {
            ts += 10;
            black_box(aggregator.update(
                dec!(110.00),
                dec!(1.5),
                ts,
                AggressorSide::Buy,
                &liquidity,
            ));
        });
    });

    c.bench_function("zone_aggregator_update_walking_price", |b| {
        let mut aggregator = ZoneAggregator::new(resolutions());
        let mut ts = 0i64;
        let mut price = dec!(100.00);
        b.iter(|| {
            ts += 10;
            price += dec!(0.01);
            if price > dec!(110.00) {
                price = dec!(100.00);
            }
            black_box(aggregator.update(price, dec!(1.5), ts, AggressorSide::Sell, &liquidity));
        });
    });
}

criterion_group!(benches, bench_zone_aggregator);
criterion_main!(benches);
