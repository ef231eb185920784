//! Error taxonomy for the order-flow signal pipeline.
//!
//! Mirrors the component boundaries of the pipeline rather than being one
//! flat enum: each boundary (preprocessing, detector analysis, signal
//! confirmation, configuration) gets its own type so callers only have to
//! match the variants relevant to them.

use thiserror::Error;

/// Errors raised while turning a raw [`crate::model::AggTrade`] into an
/// [`crate::model::EnrichedTrade`].
///
/// All variants here are `InvalidInput` class: the caller logs, increments a
/// counter, and drops the trade. None of these should ever propagate as a
/// process-fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreprocessError {
    /// Trade quantity was zero or negative.
    #[error("trade quantity must be positive, got {quantity}")]
    InvalidQuantity {
        /// The offending quantity, formatted for display.
        quantity: String,
    },

    /// Trade price was not an exact multiple of the configured tick size.
    #[error("price {price} is not aligned to tick size {tick_size}")]
    UnalignedPrice {
        /// The offending price, formatted for display.
        price: String,
        /// The configured tick size, formatted for display.
        tick_size: String,
    },

    /// A decimal string field failed to parse.
    #[error("failed to parse decimal field {field}: {value:?}")]
    DecimalParse {
        /// Name of the field that failed to parse.
        field: &'static str,
        /// Raw string value that failed to parse.
        value: String,
    },
}

/// Errors raised inside a detector's `on_enriched_trade` boundary.
///
/// Per the concurrency model, detectors never throw across the
/// `SignalManager` boundary: every variant here is caught at the detector
/// call site, counted, and converted into "drop this trade for this
/// detector" rather than propagated.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// A `FinancialMath` operation had no defined result (e.g. division by
    /// zero volume, mean of an empty sample set).
    #[error("insufficient data for {operation}")]
    InsufficientData {
        /// Name of the operation that could not produce a result.
        operation: &'static str,
    },

    /// The detector's internal circuit breaker is open.
    #[error("circuit breaker open, rejecting input")]
    CircuitOpen,

    /// The detector's analysis code panicked; caught at the boundary via
    /// `catch_unwind`.
    #[error("detector panicked during analysis: {reason}")]
    Panicked {
        /// Best-effort description of the panic payload.
        reason: String,
    },
}

/// Errors surfaced by the narrow storage/alerting/anomaly-detector contracts
/// consumed by [`crate::signal_manager::SignalManager`].
///
/// These are always non-fatal: the signal manager logs and continues, since
/// a confirmed signal is still emitted to in-process consumers even if
/// persistence fails.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying store rejected or failed a write.
    #[error("storage write failed for {operation}: {reason}")]
    WriteFailed {
        /// Name of the storage operation that failed.
        operation: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The underlying store rejected or failed a read.
    #[error("storage read failed for {operation}: {reason}")]
    ReadFailed {
        /// Name of the storage operation that failed.
        operation: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Configuration errors. Every variant here is `Fatal`: the process must
/// exit before accepting any traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file was not valid TOML, or was missing a field that has
    /// no implicit default.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field passed validation at the `serde` layer but violates a
    /// semantic invariant (e.g. weights not summing sensibly, an empty
    /// `timeWindows` list).
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Human-readable description of the violated invariant.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_error_display_mentions_field() {
        let err = PreprocessError::UnalignedPrice {
            price: "100.005".into(),
            tick_size: "0.01".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("100.005"));
        assert!(msg.contains("0.01"));
    }

    #[test]
    fn config_error_invalid_carries_reason() {
        let err = ConfigError::Invalid {
            reason: "timeWindows must not be empty".into(),
        };
        assert!(err.to_string().contains("timeWindows"));
    }
}
