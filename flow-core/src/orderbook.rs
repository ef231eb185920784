//! A incrementally-updated L2 order book fed by [`crate::model::DepthDiff`]
//! messages, providing the [`OrderBookSnapshotSource`] the preprocessor and
//! zone aggregator query for best bid/ask and passive liquidity (§6
//! "Inbound events").
//!
//! Grounded in the host project's orderbook module (`L2OrderBook`): bids
//! sorted descending, asks ascending, best-of-book is the first entry.
//! Unlike the host project's fixed 10-level snapshot copy, depth here
//! arrives as incremental diffs, so the book is a `BTreeMap` keyed on price
//! with a zero-quantity update meaning "remove this level" (standard
//! exchange depth-diff semantics).

use std::collections::BTreeMap;
use std::sync::RwLock;

use rust_decimal::Decimal;

use crate::model::DepthDiff;
use crate::preprocessor::OrderBookSnapshotSource;

#[derive(Debug, Default)]
struct BookState {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: u64,
}

impl BookState {
    fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    fn apply(&mut self, diff: &DepthDiff) {
        for &(price, qty) in &diff.bids {
            if qty.is_zero() {
                self.bids.remove(&price);
            } else {
                self.bids.insert(price, qty);
            }
        }
        for &(price, qty) in &diff.asks {
            if qty.is_zero() {
                self.asks.remove(&price);
            } else {
                self.asks.insert(price, qty);
            }
        }
        self.last_update_id = diff.final_update_id;
    }
}

/// A live, thread-safe L2 book for one symbol. `apply_diff` is called from
/// the depth-feed thread; `best_bid_ask`/`passive_liquidity` are called
/// from the trade-processing thread, so state lives behind an `RwLock`
/// rather than requiring external synchronization.
#[derive(Default)]
pub struct LiveOrderBook {
    state: RwLock<BookState>,
}

impl LiveOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one depth update. Out-of-order updates (`final_update_id`
    /// older than what's already applied) are accepted as-is; detecting and
    /// recovering from sequence gaps is the exchange client adapter's job,
    /// out of scope here (§1 Non-goals: no exchange connectivity).
    pub fn apply_diff(&self, diff: &DepthDiff) {
        self.state.write().unwrap().apply(diff);
    }

    pub fn last_update_id(&self) -> u64 {
        self.state.read().unwrap().last_update_id
    }

    pub fn is_crossed(&self) -> bool {
        let state = self.state.read().unwrap();
        match (state.best_bid(), state.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}

impl OrderBookSnapshotSource for LiveOrderBook {
    fn best_bid_ask(&self) -> (Option<Decimal>, Option<Decimal>) {
        let state = self.state.read().unwrap();
        (state.best_bid(), state.best_ask())
    }

    fn passive_liquidity(&self, lo: Decimal, hi: Decimal) -> crate::model::PassiveLiquidity {
        let state = self.state.read().unwrap();
        let bid_volume = state
            .bids
            .range(lo..=hi)
            .map(|(_, qty)| *qty)
            .fold(Decimal::ZERO, |acc, q| acc + q);
        let ask_volume = state
            .asks
            .range(lo..=hi)
            .map(|(_, qty)| *qty)
            .fold(Decimal::ZERO, |acc, q| acc + q);
        crate::model::PassiveLiquidity {
            bid_volume,
            ask_volume,
        }
    }
}
