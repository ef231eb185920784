//! Real-time order-flow microstructure signal engine.
//!
//! Raw exchange trade and depth events are enriched with a multi-resolution
//! zone view ([`preprocessor`], [`zone`]), fed through a set of pattern
//! detectors ([`detectors`]), scored and filtered by a shared indicator
//! toolkit ([`indicators`]), and finally gated into confirmed trading
//! signals by the [`signal_manager`]. [`pipeline`] wires these stages
//! together on a per-symbol worker thread; [`config`], [`monitoring`], and
//! [`resilience`] are the ambient infrastructure shared by all of them.

pub mod config;
pub mod detectors;
pub mod error;
pub mod financial_math;
pub mod ids;
pub mod indicators;
pub mod model;
pub mod monitoring;
pub mod orderbook;
pub mod pipeline;
pub mod preprocessor;
pub mod resilience;
pub mod ring_buffer;
pub mod signal_manager;
pub mod zone;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ConfigError, DetectorError, PreprocessError, StorageError};
pub use model::{AggTrade, ConfirmedSignal, DepthDiff, EnrichedTrade, SignalType};
