//! Process entry point: wires config, the per-symbol pipeline, the metrics
//! server, and shutdown handling together, then drives the pipeline off
//! newline-delimited JSON read from stdin.
//!
//! The upstream exchange WebSocket client is assumed to exist outside this
//! crate (§1 Non-goals); this binary's stdin-JSON-lines loop is the
//! narrowest adapter that can stand in for it without pulling exchange
//! connectivity into scope. Each line is either an `AggTrade` or a
//! `DepthDiff`, tagged by a `kind` field.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flow_core::config::Config;
use flow_core::model::{AggTrade, DepthDiff};
use flow_core::monitoring::{MetricsServer, PipelineMetrics};
use flow_core::orderbook::LiveOrderBook;
use flow_core::pipeline::{self, SymbolPipeline};
use flow_core::resilience::{install_panic_handler, ResourceRegistry};
use flow_core::signal_manager::{AlertSink, MarketHealthSource, SignalEvent, SignalStorage};

#[derive(Parser, Debug)]
#[command(author, version, about = "Order-flow microstructure signal engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Overrides `monitoring.metrics_addr` from the config file.
    #[arg(long)]
    metrics_addr: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum InboundEvent {
    Trade(AggTrade),
    Depth(DepthDiff),
}

/// No production `SignalStorage` ships with this crate (§6.1) — persistence
/// is an external contract. This default logs and drops, same as the
/// no-op alert sink below.
struct LoggingStorage;

impl SignalStorage for LoggingStorage {
    fn save_signal_history(
        &self,
        signal: &flow_core::model::ProcessedSignal,
    ) -> Result<(), flow_core::StorageError> {
        info!(signal_id = %flow_core::ids::format_id(signal.candidate.id), "signal history (no storage backend configured)");
        Ok(())
    }

    fn get_recent_signals(
        &self,
        _since_ms: flow_core::model::TimestampMs,
        _limit: usize,
    ) -> Result<Vec<flow_core::model::ProcessedSignal>, flow_core::StorageError> {
        Ok(Vec::new())
    }

    fn purge_signal_history(
        &self,
        _retain_since_ms: flow_core::model::TimestampMs,
    ) -> Result<(), flow_core::StorageError> {
        Ok(())
    }
}

/// No production anomaly detector ships with this crate (§6.1) — market
/// health always reports healthy absent one being wired in.
struct AlwaysHealthy;

impl MarketHealthSource for AlwaysHealthy {
    fn get_market_health(&self) -> Result<flow_core::model::MarketHealth, flow_core::StorageError> {
        Ok(flow_core::model::MarketHealth {
            is_healthy: true,
            recommendation: flow_core::model::MarketRecommendation::Continue,
            highest_severity: flow_core::model::AnomalySeverity::None,
            critical_issues: Vec::new(),
            recent_anomaly_types: Vec::new(),
        })
    }
}

struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn notify(&self, event: &SignalEvent) -> Result<(), flow_core::StorageError> {
        match event {
            SignalEvent::Generated(confirmed) => {
                info!(signal_id = %flow_core::ids::format_id(confirmed.id), side = ?confirmed.side, price = %confirmed.price, "signal generated");
            }
            SignalEvent::Rejected { candidate_id, reason, .. } => {
                warn!(candidate_id = %flow_core::ids::format_id(*candidate_id), ?reason, "signal rejected");
            }
        }
        Ok(())
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Config must be valid before any channel opens or logging starts
    // touching shared state (§6.1 "exits with code 1 before any channel is
    // opened").
    let mut config = match Config::load(&cli.config).context("loading configuration") {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            std::process::exit(1);
        }
    };
    if let Some(addr) = cli.metrics_addr {
        config.monitoring.metrics_addr = addr;
    }

    if let Err(err) = init_logging(&config.monitoring.log_level, config.monitoring.json_logs) {
        eprintln!("fatal: failed to initialize logging: {err:#}");
        std::process::exit(1);
    }

    install_panic_handler();

    if let Err(err) = run(config) {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let registry = Arc::new(ResourceRegistry::new());
    let metrics = Arc::new(PipelineMetrics::new().context("initializing metrics registry")?);
    let book: Arc<LiveOrderBook> = Arc::new(LiveOrderBook::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    if config.monitoring.enable_metrics_server {
        let metrics_for_server = Arc::clone(&metrics);
        let addr = config.monitoring.metrics_addr.clone();
        std::thread::Builder::new()
            .name("metrics-server".into())
            .spawn(move || {
                let server = MetricsServer::new(metrics_for_server);
                if let Err(err) = server.serve(&addr) {
                    error!(%addr, "metrics server stopped: {err}");
                }
            })
            .context("spawning metrics server thread")?;
        info!(addr = %config.monitoring.metrics_addr, "metrics server listening");
    }

    let (sender, receiver) = pipeline::bounded_channel(config.pipeline.input_channel_capacity);
    let shutdown_drain_deadline = Duration::from_millis(config.pipeline.shutdown_drain_deadline_ms);

    let symbol_pipeline = SymbolPipeline::new(
        &config,
        Box::new(LoggingStorage),
        Box::new(AlwaysHealthy),
        Box::new(LoggingAlertSink),
        Arc::clone(&metrics),
    );

    let worker = pipeline::spawn_worker(
        symbol_pipeline,
        receiver.clone(),
        Arc::clone(&book) as Arc<dyn flow_core::preprocessor::OrderBookSnapshotSource + Send + Sync>,
        Arc::clone(&shutdown),
        shutdown_drain_deadline,
    );

    {
        let shutdown = Arc::clone(&shutdown);
        let registry_for_handler = Arc::clone(&registry);
        ctrlc::set_handler(move || {
            warn!("received interrupt, initiating graceful shutdown");
            shutdown.store(true, Ordering::Release);
            registry_for_handler.shutdown();
        })
        .context("installing Ctrl+C handler")?;
    }

    registry.register(0, "pipeline-shutdown-flag", {
        let shutdown = Arc::clone(&shutdown);
        move || shutdown.store(true, Ordering::Release)
    });

    read_stdin_events(&sender, &receiver, &book, &metrics);

    shutdown.store(true, Ordering::Release);
    drop(sender);
    worker.join().map_err(|_| anyhow::anyhow!("pipeline worker thread panicked"))?;

    info!("shutdown complete");
    Ok(())
}

fn read_stdin_events(
    sender: &crossbeam::channel::Sender<AggTrade>,
    receiver: &crossbeam::channel::Receiver<AggTrade>,
    book: &LiveOrderBook,
    metrics: &PipelineMetrics,
) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("error reading stdin: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEvent>(&line) {
            Ok(InboundEvent::Trade(trade)) => {
                pipeline::send_trade(sender, receiver, trade, metrics);
            }
            Ok(InboundEvent::Depth(diff)) => {
                book.apply_diff(&diff);
            }
            Err(err) => {
                warn!("dropping malformed inbound event: {err}");
            }
        }
    }
}
