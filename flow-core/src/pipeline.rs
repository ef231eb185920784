//! Wires preprocessing, detectors, indicators, and the signal manager into
//! one per-symbol worker (§5), plus the bounded drop-oldest-on-overflow
//! input channel and priority-ordered shutdown drain the module doc in
//! [`crate`] calls "the pipeline".
//!
//! Grounded in the host project's per-market engine thread: one OS thread
//! per symbol reading off an MPSC channel, with a `ResourceRegistry`
//! (`resilience`) coordinating shutdown rather than this module owning any
//! signal-handling itself — that lives at the process root (`main`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, warn};

use crate::config::Config;
use crate::detectors::{
    AbsorptionDetector, AccumulationDistributionDetector, Detector, DetectorKind,
    DetectorStatus, ExhaustionDetector, ZoneSide,
};
use crate::indicators::TraditionalIndicators;
use crate::model::{AggTrade, FilterClass, ProcessedSignal, RejectionReason, Side, SignalOutcome};
use crate::monitoring::PipelineMetrics;
use crate::preprocessor::{log_invalid_trade, OrderBookSnapshotSource, Preprocessor};
use crate::signal_manager::{AlertSink, MarketHealthSource, SignalManager, SignalStorage};

/// Creates the bounded input channel one symbol's trade feed is published
/// on. Capacity comes from [`crate::config::PipelineConfig`].
pub fn bounded_channel(capacity: usize) -> (Sender<AggTrade>, Receiver<AggTrade>) {
    channel::bounded(capacity)
}

/// Publishes `trade` onto `sender`, dropping the oldest queued trade and
/// counting it when the channel is full (§5 "Backpressure"). `crossbeam`'s
/// bounded channel has no built-in drop-oldest mode, so overflow is handled
/// by popping one element off `receiver` before retrying the send — the
/// exchange client feeding this channel must never block on a slow
/// consumer.
pub fn send_trade(
    sender: &Sender<AggTrade>,
    receiver: &Receiver<AggTrade>,
    trade: AggTrade,
    metrics: &PipelineMetrics,
) {
    match sender.try_send(trade) {
        Ok(()) => {}
        Err(TrySendError::Full(trade)) => {
            let _ = receiver.try_recv();
            metrics.trades_dropped_total.inc();
            if sender.try_send(trade).is_err() {
                metrics.trades_dropped_total.inc();
            }
        }
        Err(TrySendError::Disconnected(_)) => {
            warn!("input channel disconnected, dropping trade");
        }
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn reason_label(reason: RejectionReason) -> &'static str {
    match reason {
        RejectionReason::UnhealthyMarket => "unhealthy_market",
        RejectionReason::LowConfidence => "low_confidence",
        RejectionReason::ProcessingError => "processing_error",
        RejectionReason::Timeout => "timeout",
        RejectionReason::Duplicate => "duplicate",
    }
}

/// One symbol's complete processing stack: preprocessor, the four
/// detectors, the indicator filter, and the signal manager. Owns no
/// threading or channel state itself — [`spawn_worker`] drives it.
pub struct SymbolPipeline {
    symbol: String,
    preprocessor: Preprocessor,
    detectors: Vec<DetectorKind>,
    indicators: TraditionalIndicators,
    signal_manager: SignalManager,
    metrics: Arc<PipelineMetrics>,
}

impl SymbolPipeline {
    pub fn new(
        config: &Config,
        storage: Box<dyn SignalStorage>,
        health: Box<dyn MarketHealthSource>,
        alerts: Box<dyn AlertSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let preprocessor = Preprocessor::new(config.symbol.clone(), config.tick_size, &config.zones);
        let zone_ticks: Vec<u32> = config.zones.resolutions.iter().map(|r| r.zone_ticks).collect();

        let detectors = vec![
            DetectorKind::Absorption(AbsorptionDetector::new(config.absorption.clone(), zone_ticks)),
            DetectorKind::Exhaustion(ExhaustionDetector::new(config.exhaustion.clone())),
            DetectorKind::Accumulation(AccumulationDistributionDetector::new(
                config.accumulation.clone(),
                ZoneSide::Buy,
            )),
            DetectorKind::Distribution(AccumulationDistributionDetector::new(
                config.distribution.clone(),
                ZoneSide::Sell,
            )),
        ];

        let indicators = TraditionalIndicators::new(config.indicators.clone());
        let signal_manager = SignalManager::new(config.signal_manager.clone(), storage, health, alerts);

        Self {
            symbol: config.symbol.clone(),
            preprocessor,
            detectors,
            indicators,
            signal_manager,
            metrics,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Point-in-time health of every detector, keyed by name.
    pub fn detector_statuses(&self) -> Vec<(&'static str, DetectorStatus)> {
        self.detectors.iter().map(|d| (d.name(), d.status())).collect()
    }

    /// Runs one raw trade through validation, zone enrichment, every
    /// detector, the indicator filter, and the signal manager, in that
    /// order (§4.4-§4.9). Invalid input is logged, counted, and dropped —
    /// never propagated (§7 InvalidInput class).
    pub fn process_trade(&mut self, trade: &AggTrade, book: &dyn OrderBookSnapshotSource) {
        let enriched = match self.preprocessor.process(trade, book) {
            Ok(enriched) => enriched,
            Err(err) => {
                log_invalid_trade(self.preprocessor.symbol(), &err, trade.trade_time);
                self.metrics.trades_dropped_total.inc();
                return;
            }
        };
        self.metrics.trades_processed_total.inc();

        self.indicators.update(
            enriched.timestamp,
            enriched.price,
            enriched.quantity,
            enriched.aggressor,
        );

        for detector in &mut self.detectors {
            let Some(candidate) = detector.on_enriched_trade(&enriched) else {
                continue;
            };

            let class = FilterClass::from(candidate.signal_type);
            if !self.indicators.passes(class, candidate.side, candidate.price) {
                self.metrics
                    .signals_rejected_total
                    .with_label_values(&["indicator_filtered"])
                    .inc();
                continue;
            }

            let detector_name = detector.name();
            let side = candidate.side;
            let price = candidate.price;
            let processed = ProcessedSignal {
                candidate,
                detector_name,
                received_at: enriched.timestamp,
            };

            match self.signal_manager.process(processed) {
                SignalOutcome::Confirmed(confirmed) => {
                    self.metrics
                        .signals_generated_total
                        .with_label_values(&[detector_name, side_label(confirmed.side)])
                        .inc();
                    self.metrics
                        .signal_confidence
                        .observe(confirmed.confidence.to_f64().unwrap_or(0.0));
                    detector.mark_signal_confirmed(price, side);
                    info!(
                        symbol = %self.symbol,
                        detector = detector_name,
                        signal_id = confirmed.id,
                        side = side_label(confirmed.side),
                        confidence = %confirmed.confidence,
                        "signal confirmed"
                    );
                }
                SignalOutcome::Rejected { reason, .. } => {
                    self.metrics
                        .signals_rejected_total
                        .with_label_values(&[reason_label(reason)])
                        .inc();
                }
            }
        }
    }
}

/// Drives [`SymbolPipeline::process_trade`] on its own OS thread, reading
/// off `receiver` until `shutdown` is observed, then draining whatever is
/// left in the channel up to `shutdown_drain_deadline` before returning
/// (§5 "Cancellation"). The 200 ms receive timeout bounds how long shutdown
/// can take to notice the flag once nothing is arriving.
pub fn spawn_worker(
    mut pipeline: SymbolPipeline,
    receiver: Receiver<AggTrade>,
    book: Arc<dyn OrderBookSnapshotSource + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    shutdown_drain_deadline: Duration,
) -> thread::JoinHandle<()> {
    let symbol = pipeline.symbol().to_string();
    thread::Builder::new()
        .name(format!("pipeline-{symbol}"))
        .spawn(move || {
            info!(symbol = %symbol, "pipeline worker started");
            loop {
                match receiver.recv_timeout(Duration::from_millis(200)) {
                    Ok(trade) => {
                        pipeline.metrics.pipeline_queue_depth.set(receiver.len() as i64);
                        pipeline.process_trade(&trade, book.as_ref());
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            drain_deadline(&mut pipeline, &receiver, book.as_ref(), shutdown_drain_deadline);
            info!(symbol = %symbol, "pipeline worker stopped");
        })
        .expect("failed to spawn pipeline worker thread")
}

fn drain_deadline(
    pipeline: &mut SymbolPipeline,
    receiver: &Receiver<AggTrade>,
    book: &dyn OrderBookSnapshotSource,
    deadline: Duration,
) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        match receiver.try_recv() {
            Ok(trade) => pipeline.process_trade(&trade, book),
            Err(_) => break,
        }
    }
}
