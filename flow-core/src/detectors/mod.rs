//! The four microstructure detectors (§4.5-§4.7) behind one uniform
//! interface.
//!
//! The distilled spec's original shape is a class hierarchy: a base
//! detector implements shared bookkeeping (cooldowns, confidence
//! clamping, candidate construction) and each concrete detector overrides
//! a handful of template methods. Rust has no implementation inheritance,
//! and a trait object can't add per-variant fields cheaply at this call
//! frequency, so this is reshaped into a closed, tagged-variant enum
//! (`DetectorKind`) implementing one trait (`Detector`) by matching and
//! delegating to each concrete detector's own method of the same name —
//! the shared bookkeeping that used to live in a base class instead lives
//! in free functions in `shared` that every concrete detector calls
//! explicitly (§9 design note).

pub mod absorption;
pub mod accumulation_distribution;
pub mod exhaustion;
mod shared;

use crate::model::{EnrichedTrade, SignalCandidate, Side};

pub use absorption::AbsorptionDetector;
pub use accumulation_distribution::{AccumulationDistributionDetector, ZoneSide};
pub use exhaustion::ExhaustionDetector;

/// Point-in-time health of a detector instance, surfaced for monitoring
/// and for the signal manager's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStatus {
    pub tracked_zones: usize,
    pub circuit_open: bool,
}

/// Uniform interface every concrete detector implements, replacing the
/// original's template-method base class.
pub trait Detector {
    /// Feeds one enriched trade to the detector. Returns a candidate
    /// signal when this trade completes the detector's pattern.
    fn on_enriched_trade(&mut self, trade: &EnrichedTrade) -> Option<SignalCandidate>;

    /// Called by the signal manager once a candidate this detector
    /// produced is confirmed, so the detector can update its own
    /// state-machine bookkeeping (e.g. reset a zone's cooldown).
    fn mark_signal_confirmed(&mut self, price: rust_decimal::Decimal, side: Side);

    fn status(&self) -> DetectorStatus;

    fn name(&self) -> &'static str;
}

/// A closed set of the four concrete detectors, dispatched over by the
/// pipeline without any dynamic dispatch or trait objects.
pub enum DetectorKind {
    Absorption(AbsorptionDetector),
    Exhaustion(ExhaustionDetector),
    Accumulation(AccumulationDistributionDetector),
    Distribution(AccumulationDistributionDetector),
}

impl Detector for DetectorKind {
    fn on_enriched_trade(&mut self, trade: &EnrichedTrade) -> Option<SignalCandidate> {
        match self {
            DetectorKind::Absorption(d) => d.on_enriched_trade(trade),
            DetectorKind::Exhaustion(d) => d.on_enriched_trade(trade),
            DetectorKind::Accumulation(d) => d.on_enriched_trade(trade),
            DetectorKind::Distribution(d) => d.on_enriched_trade(trade),
        }
    }

    fn mark_signal_confirmed(&mut self, price: rust_decimal::Decimal, side: Side) {
        match self {
            DetectorKind::Absorption(d) => d.mark_signal_confirmed(price, side),
            DetectorKind::Exhaustion(d) => d.mark_signal_confirmed(price, side),
            DetectorKind::Accumulation(d) => d.mark_signal_confirmed(price, side),
            DetectorKind::Distribution(d) => d.mark_signal_confirmed(price, side),
        }
    }

    fn status(&self) -> DetectorStatus {
        match self {
            DetectorKind::Absorption(d) => d.status(),
            DetectorKind::Exhaustion(d) => d.status(),
            DetectorKind::Accumulation(d) => d.status(),
            DetectorKind::Distribution(d) => d.status(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DetectorKind::Absorption(d) => d.name(),
            DetectorKind::Exhaustion(d) => d.name(),
            DetectorKind::Accumulation(d) => d.name(),
            DetectorKind::Distribution(d) => d.name(),
        }
    }
}
