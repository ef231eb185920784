//! Prometheus metrics (§1.1, added) and the synchronous `/metrics` HTTP
//! endpoint (§6.1).
//!
//! Grounded in the host project's `monitoring::metrics`/`monitoring::server`
//! modules, with one deliberate divergence: the host serves metrics over
//! `hyper`/`tokio`, but this system has no other use for an async runtime
//! (the pipeline itself is synchronous per §5), so pulling in `tokio` just
//! to answer `GET /metrics` would be the only async code in the crate. A
//! minimal `std::net::TcpListener` loop on its own thread does the same job
//! without the dependency — see DESIGN.md.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::{debug, error, info, warn};

/// Central registry for every metric this pipeline exposes.
pub struct PipelineMetrics {
    registry: Registry,

    pub signals_generated_total: IntCounterVec,
    pub signals_rejected_total: IntCounterVec,
    pub detector_errors_total: IntCounterVec,
    pub circuit_breaker_trips_total: IntCounterVec,
    pub zone_cache_evictions_total: IntCounterVec,
    pub trades_processed_total: Counter,
    pub trades_dropped_total: Counter,
    pub pipeline_queue_depth: IntGauge,
    pub signal_confidence: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let signals_generated_total = IntCounterVec::new(
            Opts::new("signals_generated_total", "Total confirmed trading signals emitted")
                .namespace("flow"),
            &["signal_type", "side"],
        )?;
        registry.register(Box::new(signals_generated_total.clone()))?;

        let signals_rejected_total = IntCounterVec::new(
            Opts::new("signals_rejected_total", "Total signal candidates rejected")
                .namespace("flow"),
            &["reason"],
        )?;
        registry.register(Box::new(signals_rejected_total.clone()))?;

        let detector_errors_total = IntCounterVec::new(
            Opts::new("detector_errors_total", "Total detector-internal errors")
                .namespace("flow"),
            &["detector"],
        )?;
        registry.register(Box::new(detector_errors_total.clone()))?;

        let circuit_breaker_trips_total = IntCounterVec::new(
            Opts::new("circuit_breaker_trips_total", "Total circuit breaker trips")
                .namespace("flow"),
            &["detector"],
        )?;
        registry.register(Box::new(circuit_breaker_trips_total.clone()))?;

        let zone_cache_evictions_total = IntCounterVec::new(
            Opts::new("zone_cache_evictions_total", "Total zones evicted from the aggregator cache")
                .namespace("flow"),
            &["resolution"],
        )?;
        registry.register(Box::new(zone_cache_evictions_total.clone()))?;

        let trades_processed_total = Counter::new(
            "flow_trades_processed_total",
            "Total aggregated trades processed by the preprocessor",
        )?;
        registry.register(Box::new(trades_processed_total.clone()))?;

        let trades_dropped_total = Counter::new(
            "flow_trades_dropped_total",
            "Total aggregated trades dropped (invalid input or input-channel overflow)",
        )?;
        registry.register(Box::new(trades_dropped_total.clone()))?;

        let pipeline_queue_depth = IntGauge::new(
            "flow_pipeline_queue_depth",
            "Current depth of the bounded input channel",
        )?;
        registry.register(Box::new(pipeline_queue_depth.clone()))?;

        let signal_confidence = Histogram::with_opts(
            HistogramOpts::new("flow_signal_confidence", "Final confidence of confirmed signals")
                .buckets(vec![0.3, 0.4, 0.5, 0.6, 0.7, 0.75, 0.8, 0.9, 0.95, 1.0]),
        )?;
        registry.register(Box::new(signal_confidence.clone()))?;

        Ok(Self {
            registry,
            signals_generated_total,
            signals_rejected_total,
            detector_errors_total,
            circuit_breaker_trips_total,
            zone_cache_evictions_total,
            trades_processed_total,
            trades_dropped_total,
            pipeline_queue_depth,
            signal_confidence,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes every registered metric family as Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// A minimal synchronous `GET /metrics` server. One thread per connection,
/// no keep-alive — scraped infrequently by Prometheus, so simplicity wins
/// over throughput here.
pub struct MetricsServer {
    metrics: Arc<PipelineMetrics>,
}

impl MetricsServer {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self { metrics }
    }

    /// Binds `addr` and serves requests until the listener errs out. Meant
    /// to be spawned on its own thread; never suspends the pipeline thread.
    pub fn serve(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!(addr, "metrics server listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let metrics = Arc::clone(&self.metrics);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &metrics) {
                            debug!(error = %e, "metrics connection error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "failed to accept metrics connection"),
            }
        }
        Ok(())
    }
}

fn handle_connection(mut stream: TcpStream, metrics: &PipelineMetrics) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).unwrap_or(0);
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request.lines().next().unwrap_or("").split_whitespace().nth(1).unwrap_or("/");

    let (status, content_type, body) = if path == "/metrics" {
        match metrics.encode() {
            Ok(text) => ("200 OK", "text/plain; version=0.0.4", text),
            Err(e) => {
                error!(error = %e, "failed to encode metrics");
                ("500 Internal Server Error", "text/plain", format!("error: {e}"))
            }
        }
    } else if path == "/healthz" {
        ("200 OK", "text/plain", "ok".to_string())
    } else {
        ("404 Not Found", "text/plain", "not found".to_string())
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_registry_creation_registers_families() {
        let metrics = PipelineMetrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn encode_includes_registered_metric_names() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics
            .signals_generated_total
            .with_label_values(&["absorption", "sell"])
            .inc();
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("flow_signals_generated_total"));
    }
}
