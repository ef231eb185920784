//! Multi-resolution, time-windowed zone tracking — §4.3.
//!
//! Exclusively owned by [`crate::preprocessor::Preprocessor`]; everything
//! downstream only ever sees the read-only [`crate::model::ZoneSnapshot`]
//! values handed to it inside an [`crate::model::EnrichedTrade`].

pub mod aggregator;

pub use aggregator::{ZoneAggregator, ZoneLiquiditySource, ZoneResolutionConfig};
