//! In-crate test doubles for the external contracts this crate consumes but
//! does not implement: order-book snapshots, signal storage, market health,
//! and alerting (§6.1).
//!
//! Mirrors the host project's `testing::mock_huginn` pattern of an in-crate
//! mock standing in for an out-of-process dependency, rather than this
//! crate shipping a production implementation it has no business owning.

use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::error::StorageError;
use crate::model::{
    AnomalySeverity, MarketHealth, MarketRecommendation, PassiveLiquidity, ProcessedSignal,
    TimestampMs,
};
use crate::preprocessor::OrderBookSnapshotSource;
use crate::signal_manager::{AlertSink, MarketHealthSource, SignalEvent, SignalStorage};

/// A fixed best-bid/ask and fixed passive liquidity on every price range
/// queried, for tests that don't exercise book-state transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOrderBook {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub passive: PassiveLiquidity,
}

impl OrderBookSnapshotSource for FixedOrderBook {
    fn best_bid_ask(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.best_bid, self.best_ask)
    }

    fn passive_liquidity(&self, _lo: Decimal, _hi: Decimal) -> PassiveLiquidity {
        self.passive
    }
}

/// Records every call without persisting anything, for tests that only
/// care whether the signal manager attempted a write.
#[derive(Default)]
pub struct RecordingStorage {
    pub saved: Mutex<Vec<ProcessedSignal>>,
    pub purged: Mutex<Vec<TimestampMs>>,
}

impl SignalStorage for RecordingStorage {
    fn save_signal_history(&self, signal: &ProcessedSignal) -> Result<(), StorageError> {
        self.saved.lock().unwrap().push(signal.clone());
        Ok(())
    }

    fn get_recent_signals(
        &self,
        _since_ms: TimestampMs,
        _limit: usize,
    ) -> Result<Vec<ProcessedSignal>, StorageError> {
        Ok(Vec::new())
    }

    fn purge_signal_history(&self, retain_since_ms: TimestampMs) -> Result<(), StorageError> {
        self.purged.lock().unwrap().push(retain_since_ms);
        Ok(())
    }
}

/// Always reports the wrapped [`MarketHealth`], defaulting to healthy.
pub struct FixedMarketHealth(pub MarketHealth);

impl Default for FixedMarketHealth {
    fn default() -> Self {
        Self(MarketHealth {
            is_healthy: true,
            recommendation: MarketRecommendation::Continue,
            highest_severity: AnomalySeverity::None,
            critical_issues: Vec::new(),
            recent_anomaly_types: Vec::new(),
        })
    }
}

impl MarketHealthSource for FixedMarketHealth {
    fn get_market_health(&self) -> Result<MarketHealth, StorageError> {
        Ok(self.0.clone())
    }
}

/// Records every dispatched [`SignalEvent`] for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    pub events: Mutex<Vec<SignalEvent>>,
}

impl AlertSink for RecordingAlertSink {
    fn notify(&self, event: &SignalEvent) -> Result<(), StorageError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_order_book_reports_configured_liquidity() {
        let book = FixedOrderBook {
            best_bid: Some(dec!(99.99)),
            best_ask: Some(dec!(100.01)),
            passive: PassiveLiquidity {
                bid_volume: dec!(10),
                ask_volume: dec!(20),
            },
        };
        assert_eq!(book.best_bid_ask(), (Some(dec!(99.99)), Some(dec!(100.01))));
        assert_eq!(book.passive_liquidity(dec!(0), dec!(1)).total(), dec!(30));
    }

    #[test]
    fn recording_storage_tracks_saves_and_purges() {
        let storage = RecordingStorage::default();
        storage.purge_signal_history(1_000).unwrap();
        assert_eq!(*storage.purged.lock().unwrap(), vec![1_000]);
    }
}
