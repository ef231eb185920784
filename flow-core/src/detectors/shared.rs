//! Bookkeeping shared by every concrete detector, in lieu of the template
//! methods a base class would provide (§9 design note).

use rust_decimal::Decimal;

use crate::ids::generate_id;
use crate::model::{SignalCandidate, SignalCandidateData, SignalType, TimestampMs};

/// Clamps a confidence value into `[0, 1]`. Called at every write site a
/// confidence value is produced or boosted, never only once at the end —
/// an intermediate boosted value above 1.0 must never leak into a log
/// line or a later additive boost.
pub fn clamp_confidence(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Whether `cooldown_ms` has elapsed since `last_event`, or no prior event
/// is recorded at all.
pub fn cooldown_elapsed(last_event: Option<TimestampMs>, now: TimestampMs, cooldown_ms: i64) -> bool {
    match last_event {
        Some(last) => now - last >= cooldown_ms,
        None => true,
    }
}

/// Builds a [`SignalCandidate`] with a fresh id and clamped confidence,
/// the one construction path every detector uses so no candidate is ever
/// assembled with an out-of-range confidence.
#[allow(clippy::too_many_arguments)]
pub fn build_candidate(
    signal_type: SignalType,
    symbol: &str,
    price: Decimal,
    confidence: Decimal,
    timestamp: TimestampMs,
    data: SignalCandidateData,
) -> SignalCandidate {
    SignalCandidate {
        id: generate_id(),
        signal_type,
        side: signal_type.trading_side(),
        confidence: clamp_confidence(confidence),
        timestamp,
        symbol: symbol.to_string(),
        price,
        data,
    }
}
