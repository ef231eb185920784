//! Gates a stream of [`ProcessedSignal`]s into [`ConfirmedSignal`]s or
//! rejections: market-health check, confidence floor, correlation scoring,
//! side mapping, and TP/SL attachment (§4.9).
//!
//! The external contracts this component consumes — persistence, market
//! health, alerting — are represented as traits with no production
//! implementation shipped; only test doubles live in this crate, under
//! [`crate::testing`], mirroring the host project's pattern of an in-crate
//! mock standing in for an out-of-process dependency.

use rust_decimal::Decimal;
use tracing::{error, warn};

use crate::config::SignalManagerConfig;
use crate::error::StorageError;
use crate::model::{
    AnomalySeverity, ConfirmedSignal, CorrelationStats, MarketHealth, MarketHealthSnapshot,
    MarketRecommendation, ProcessedSignal, RejectionReason, SignalOutcome, SignalType,
    TimestampMs,
};

/// Persistence contract for signal history and background jobs (§6
/// "Storage contract"). No production implementation ships in this crate.
pub trait SignalStorage: Send + Sync {
    fn save_signal_history(&self, signal: &ProcessedSignal) -> Result<(), StorageError>;
    fn get_recent_signals(
        &self,
        since_ms: TimestampMs,
        limit: usize,
    ) -> Result<Vec<ProcessedSignal>, StorageError>;
    fn purge_signal_history(&self, retain_since_ms: TimestampMs) -> Result<(), StorageError>;
}

/// The external anomaly detector's market-health contract (§6
/// "Anomaly-detector contract").
pub trait MarketHealthSource: Send + Sync {
    fn get_market_health(&self) -> Result<MarketHealth, StorageError>;
}

/// Outbound notification fired for a terminal [`SignalOutcome`] (§6
/// "Outbound events"). Fire-and-forget: the caller logs a failure and
/// continues rather than propagating it.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    /// A signal that cleared every gate in `process` (market health,
    /// confidence threshold) and became a `ConfirmedSignal`. There is no
    /// separate "confirmed" variant distinct from this one: in this
    /// system confirmation happens synchronously inside `process` — a
    /// candidate is either rejected at a gate or emerges fully confirmed
    /// in the same call, with no intermediate pending state an event
    /// could observe.
    Generated(ConfirmedSignal),
    Rejected {
        candidate_id: u128,
        signal_type: SignalType,
        reason: RejectionReason,
    },
}

pub trait AlertSink: Send + Sync {
    fn notify(&self, event: &SignalEvent) -> Result<(), StorageError>;
}

/// Computes take-profit/stop-loss for a confirmed signal. Out of scope
/// per the "no order execution, no position management" boundary; the
/// default implementation is a deliberate stub returning `None` for both,
/// letting a host application inject the real calculation without this
/// crate depending on it.
pub trait TpSlCalculator: Send + Sync {
    fn calculate(&self, price: Decimal, side: crate::model::Side) -> (Option<Decimal>, Option<Decimal>);
}

/// The documented stub: no take-profit/stop-loss calculation.
pub struct NullTpSlCalculator;

impl TpSlCalculator for NullTpSlCalculator {
    fn calculate(&self, _price: Decimal, _side: crate::model::Side) -> (Option<Decimal>, Option<Decimal>) {
        (None, None)
    }
}

struct RecentSignal {
    signal_type: SignalType,
    price: Decimal,
    timestamp: TimestampMs,
}

/// Gates [`ProcessedSignal`]s into confirmed trading signals (§4.9).
pub struct SignalManager {
    config: SignalManagerConfig,
    storage: Box<dyn SignalStorage>,
    health: Box<dyn MarketHealthSource>,
    alerts: Box<dyn AlertSink>,
    tp_sl: Box<dyn TpSlCalculator>,
    recent: Vec<RecentSignal>,
    last_maintenance: TimestampMs,
}

impl SignalManager {
    pub fn new(
        config: SignalManagerConfig,
        storage: Box<dyn SignalStorage>,
        health: Box<dyn MarketHealthSource>,
        alerts: Box<dyn AlertSink>,
    ) -> Self {
        Self::with_tp_sl_calculator(config, storage, health, alerts, Box::new(NullTpSlCalculator))
    }

    pub fn with_tp_sl_calculator(
        config: SignalManagerConfig,
        storage: Box<dyn SignalStorage>,
        health: Box<dyn MarketHealthSource>,
        alerts: Box<dyn AlertSink>,
        tp_sl: Box<dyn TpSlCalculator>,
    ) -> Self {
        Self {
            config,
            storage,
            health,
            alerts,
            tp_sl,
            recent: Vec::new(),
            last_maintenance: 0,
        }
    }

    /// Runs one processed signal through the full gate pipeline (§4.9
    /// steps 1-7).
    pub fn process(&mut self, signal: ProcessedSignal) -> SignalOutcome {
        let candidate_id = signal.candidate.id;
        let signal_type = signal.candidate.signal_type;
        let now = signal.candidate.timestamp;

        let health_snapshot = match self.evaluate_market_health() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "market health check failed, failing open");
                MarketHealthSnapshot {
                    is_healthy: true,
                    recommendation: MarketRecommendation::Continue,
                    highest_severity: AnomalySeverity::None,
                }
            }
        };
        if !health_snapshot.is_healthy {
            return self.reject(candidate_id, signal_type, RejectionReason::UnhealthyMarket);
        }

        let rounded_confidence = signal.candidate.confidence.round_dp(2);
        let rounded_threshold = self.config.confidence_threshold.round_dp(2);
        if rounded_confidence < rounded_threshold {
            return self.reject(candidate_id, signal_type, RejectionReason::LowConfidence);
        }

        let correlation = self.score_correlation(signal_type, signal.candidate.price, now);
        let final_confidence = (rounded_confidence
            * (Decimal::ONE + correlation.strength * self.config.correlation_boost_factor))
            .min(Decimal::ONE);

        let side = signal_type.trading_side();
        let (take_profit, stop_loss) = self.tp_sl.calculate(signal.candidate.price, side);

        let confirmed = ConfirmedSignal {
            id: candidate_id,
            signal_type,
            side,
            price: signal.candidate.price,
            confidence: final_confidence,
            timestamp: now,
            correlation,
            market_health: health_snapshot,
            take_profit,
            stop_loss,
            confirmations: Vec::new(),
        };

        if let Err(err) = self.storage.save_signal_history(&signal) {
            warn!(error = %err, "failed to persist signal history");
        }

        self.recent.push(RecentSignal {
            signal_type,
            price: confirmed.price,
            timestamp: now,
        });

        let event = SignalEvent::Generated(confirmed.clone());
        if let Err(err) = self.alerts.notify(&event) {
            warn!(error = %err, "alert dispatch failed");
        }

        self.maintain(now);

        SignalOutcome::Confirmed(confirmed)
    }

    fn reject(
        &mut self,
        candidate_id: u128,
        signal_type: SignalType,
        reason: RejectionReason,
    ) -> SignalOutcome {
        let event = SignalEvent::Rejected {
            candidate_id,
            signal_type,
            reason,
        };
        if let Err(err) = self.alerts.notify(&event) {
            warn!(error = %err, "alert dispatch failed for rejection");
        }
        SignalOutcome::Rejected {
            candidate_id,
            reason,
        }
    }

    fn evaluate_market_health(&self) -> Result<MarketHealthSnapshot, StorageError> {
        let health = self.health.get_market_health()?;
        let unhealthy = matches!(
            health.recommendation,
            MarketRecommendation::ClosePositions | MarketRecommendation::InsufficientData
        ) || health.highest_severity == AnomalySeverity::Critical
            || !health.critical_issues.is_empty();

        Ok(MarketHealthSnapshot {
            is_healthy: health.is_healthy && !unhealthy,
            recommendation: health.recommendation,
            highest_severity: health.highest_severity,
        })
    }

    /// §4.9 step 3: prior same-type signals within `correlationWindowMs`
    /// and `priceTolerance = 0.001 * price`.
    fn score_correlation(
        &self,
        signal_type: SignalType,
        price: Decimal,
        now: TimestampMs,
    ) -> CorrelationStats {
        let window_start = now - self.config.correlation_window_ms;
        let tolerance = price * Decimal::new(1, 3);

        let correlated_count = self
            .recent
            .iter()
            .filter(|r| {
                r.signal_type == signal_type
                    && r.timestamp >= window_start
                    && (r.price - price).abs() <= tolerance
            })
            .count() as u32;

        let strength = (Decimal::from(correlated_count) / Decimal::from(3))
            .min(Decimal::ONE);

        CorrelationStats {
            correlated_count,
            strength,
        }
    }

    /// §4.9 "Periodic maintenance": purges `recent` and instructs storage
    /// to purge signal history beyond retention. Call on every processed
    /// signal; internally throttled to `maintenanceIntervalMs`.
    fn maintain(&mut self, now: TimestampMs) {
        if now - self.last_maintenance < self.config.maintenance_interval_ms {
            return;
        }
        self.last_maintenance = now;

        let cutoff = now - self.config.signal_timeout_ms;
        self.recent.retain(|r| r.timestamp >= cutoff);
        if self.recent.len() > self.config.max_history_size {
            let excess = self.recent.len() - self.config.max_history_size;
            self.recent.drain(0..excess);
        }

        if let Err(err) = self.storage.purge_signal_history(cutoff) {
            error!(error = %err, "failed to purge signal history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SignalCandidate, SignalCandidateData, Side};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct AlwaysHealthy;
    impl MarketHealthSource for AlwaysHealthy {
        fn get_market_health(&self) -> Result<MarketHealth, StorageError> {
            Ok(MarketHealth {
                is_healthy: true,
                recommendation: MarketRecommendation::Continue,
                highest_severity: AnomalySeverity::None,
                critical_issues: Vec::new(),
                recent_anomaly_types: Vec::new(),
            })
        }
    }

    struct AlwaysUnhealthy;
    impl MarketHealthSource for AlwaysUnhealthy {
        fn get_market_health(&self) -> Result<MarketHealth, StorageError> {
            Ok(MarketHealth {
                is_healthy: false,
                recommendation: MarketRecommendation::ClosePositions,
                highest_severity: AnomalySeverity::Critical,
                critical_issues: vec!["funding spike".into()],
                recent_anomaly_types: Vec::new(),
            })
        }
    }

    struct FailingHealth;
    impl MarketHealthSource for FailingHealth {
        fn get_market_health(&self) -> Result<MarketHealth, StorageError> {
            Err(StorageError::ReadFailed {
                operation: "getMarketHealth",
                reason: "timeout".into(),
            })
        }
    }

    struct NoopStorage;
    impl SignalStorage for NoopStorage {
        fn save_signal_history(&self, _signal: &ProcessedSignal) -> Result<(), StorageError> {
            Ok(())
        }
        fn get_recent_signals(
            &self,
            _since_ms: TimestampMs,
            _limit: usize,
        ) -> Result<Vec<ProcessedSignal>, StorageError> {
            Ok(Vec::new())
        }
        fn purge_signal_history(&self, _retain_since_ms: TimestampMs) -> Result<(), StorageError> {
            Ok(())
        }
    }

    struct RecordingAlerts {
        events: Mutex<Vec<SignalEvent>>,
    }
    impl RecordingAlerts {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }
    impl AlertSink for RecordingAlerts {
        fn notify(&self, event: &SignalEvent) -> Result<(), StorageError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn config() -> SignalManagerConfig {
        SignalManagerConfig {
            confidence_threshold: dec!(0.5),
            signal_timeout_ms: 3_600_000,
            correlation_window_ms: 60_000,
            max_history_size: 1_000,
            correlation_boost_factor: dec!(0.15),
            maintenance_interval_ms: 60_000,
        }
    }

    fn processed(signal_type: SignalType, price: Decimal, confidence: Decimal, timestamp: TimestampMs) -> ProcessedSignal {
        ProcessedSignal {
            candidate: SignalCandidate {
                id: timestamp as u128,
                signal_type,
                side: signal_type.trading_side(),
                confidence,
                timestamp,
                symbol: "LTCUSDT".into(),
                price,
                data: SignalCandidateData::Exhaustion {
                    depletion_factor: dec!(0.5),
                    depletion_ratio: dec!(0.5),
                    aggressive_volume: dec!(20),
                },
            },
            detector_name: "exhaustion",
            received_at: timestamp,
        }
    }

    fn manager(health: Box<dyn MarketHealthSource>) -> SignalManager {
        SignalManager::new(config(), Box::new(NoopStorage), health, Box::new(RecordingAlerts::new()))
    }

    #[test]
    fn unhealthy_market_rejects() {
        let mut mgr = manager(Box::new(AlwaysUnhealthy));
        let outcome = mgr.process(processed(SignalType::Exhaustion, dec!(100), dec!(0.9), 1_000));
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected {
                reason: RejectionReason::UnhealthyMarket,
                ..
            }
        ));
    }

    #[test]
    fn health_check_failure_fails_open() {
        let mut mgr = manager(Box::new(FailingHealth));
        let outcome = mgr.process(processed(SignalType::Exhaustion, dec!(100), dec!(0.9), 1_000));
        assert!(matches!(outcome, SignalOutcome::Confirmed(_)));
    }

    #[test]
    fn below_confidence_threshold_rejects() {
        let mut mgr = manager(Box::new(AlwaysHealthy));
        let outcome = mgr.process(processed(SignalType::Exhaustion, dec!(100), dec!(0.1), 1_000));
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected {
                reason: RejectionReason::LowConfidence,
                ..
            }
        ));
    }

    #[test]
    fn exhaustion_confirms_as_sell_side() {
        let mut mgr = manager(Box::new(AlwaysHealthy));
        let outcome = mgr.process(processed(SignalType::Exhaustion, dec!(100), dec!(0.9), 1_000));
        match outcome {
            SignalOutcome::Confirmed(signal) => assert_eq!(signal.side, Side::Sell),
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn correlated_repeats_boost_confidence() {
        let mut mgr = manager(Box::new(AlwaysHealthy));
        let first = mgr.process(processed(SignalType::Exhaustion, dec!(100), dec!(0.6), 1_000));
        let second = mgr.process(processed(SignalType::Exhaustion, dec!(100.05), dec!(0.6), 2_000));

        let SignalOutcome::Confirmed(first) = first else {
            panic!("expected first confirmation");
        };
        let SignalOutcome::Confirmed(second) = second else {
            panic!("expected second confirmation");
        };
        assert_eq!(first.correlation.correlated_count, 0);
        assert_eq!(second.correlation.correlated_count, 1);
        assert!(second.confidence > first.confidence);
    }
}
