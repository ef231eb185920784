//! Resilience primitives carried from the host project (§1.1, §9): a
//! generic three-state circuit breaker, a process-wide panic handler, and
//! an explicit `ResourceRegistry` for priority-ordered graceful shutdown
//! replacing the original's singleton `StorageResourceManager`.

use std::panic;
use std::process;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed = 0,
    /// Tripped, calls fail fast.
    Open = 1,
    /// Testing whether the failure has cleared.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub failure_window: Duration,
    pub timeout: Duration,
    pub success_threshold: u64,
}

/// Generic three-state circuit breaker used by the [`crate::detectors::exhaustion`]
/// detector (§4.6 step 5): `failure_threshold` errors within `failure_window`
/// trips it open; after `timeout` it allows one probe call (`HalfOpen`),
/// closing again after `success_threshold` consecutive successes, or
/// reopening immediately on any failure while half-open.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<AtomicU8>,
    failure_count: Arc<AtomicU64>,
    success_count: Arc<AtomicU64>,
    last_failure_time: Arc<Mutex<Option<Instant>>>,
    last_state_change: Arc<Mutex<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(AtomicU8::new(CircuitState::Closed as u8)),
            failure_count: Arc::new(AtomicU64::new(0)),
            success_count: Arc::new(AtomicU64::new(0)),
            last_failure_time: Arc::new(Mutex::new(None)),
            last_state_change: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Whether a call may proceed right now. `Open` self-transitions to
    /// `HalfOpen` once `timeout` has elapsed since the last state change.
    pub fn is_call_permitted(&self) -> bool {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_change = *self.last_state_change.lock();
                if last_change.elapsed() >= self.config.timeout {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();
        match state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();
        let now = Instant::now();

        match state {
            CircuitState::Closed => {
                let mut last_failure = self.last_failure_time.lock();
                let window_lapsed = last_failure
                    .is_some_and(|last| now.duration_since(last) > self.config.failure_window);
                if window_lapsed {
                    self.failure_count.store(0, Ordering::Release);
                }
                *last_failure = Some(now);
                drop(last_failure);

                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                *self.last_failure_time.lock() = Some(now);
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self) {
        debug!("circuit breaker closing");
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    fn transition_to_open(&self) {
        warn!("circuit breaker tripped open");
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    fn transition_to_half_open(&self) {
        debug!("circuit breaker probing half-open");
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            state: Arc::clone(&self.state),
            failure_count: Arc::clone(&self.failure_count),
            success_count: Arc::clone(&self.success_count),
            last_failure_time: Arc::clone(&self.last_failure_time),
            last_state_change: Arc::clone(&self.last_state_change),
        }
    }
}

/// Installs a process-wide panic hook that logs the panic location and
/// message via `tracing` before delegating to the default hook. Does not
/// catch the panic — the thread still unwinds/aborts; this only ensures
/// the failure is logged before the process exits (§7 Fatal path).
pub fn install_panic_handler() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<no message>".to_string()
        };

        error!(location = %location, message = %message, "panic in pipeline thread");
        default_hook(panic_info);
    }));
}

/// A registered cleanup callback: lower `priority` runs first. The pipeline
/// registers detectors before the preprocessor before storage, so shutdown
/// tears dependents down before their dependencies (§5).
struct Registration {
    priority: u8,
    name: &'static str,
    cleanup: Box<dyn FnOnce() + Send>,
}

/// Coordinates graceful shutdown across every component that needs to
/// release resources, replacing the original's singleton
/// `StorageResourceManager` (§9) with one struct owned by the process
/// root and passed by reference to anything that needs to register.
#[derive(Default)]
pub struct ResourceRegistry {
    registrations: Mutex<Vec<Registration>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup callback. Lower `priority` values run first.
    pub fn register(&self, priority: u8, name: &'static str, cleanup: impl FnOnce() + Send + 'static) {
        self.registrations.lock().push(Registration {
            priority,
            name,
            cleanup: Box::new(cleanup),
        });
    }

    /// Runs every registered callback in ascending priority order,
    /// draining the registry. Safe to call at most once meaningfully —
    /// a second call runs whatever was registered since.
    pub fn shutdown(&self) {
        let mut registrations = self.registrations.lock();
        registrations.sort_by_key(|r| r.priority);
        for reg in registrations.drain(..) {
            info!(component = reg.name, "running shutdown cleanup");
            (reg.cleanup)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn config(failure_threshold: u64, timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            failure_window: Duration::from_secs(60),
            timeout,
            success_threshold: 2,
        }
    }

    #[test]
    fn starts_closed_and_permits_calls() {
        let cb = CircuitBreaker::new(config(3, Duration::from_secs(1)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_call_permitted());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(config(3, Duration::from_secs(1)));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_call_permitted());
    }

    #[test]
    fn half_open_recovers_on_successes() {
        let cb = CircuitBreaker::new(config(2, Duration::from_millis(10)));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(20));
        assert!(cb.is_call_permitted());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new(config(2, Duration::from_millis(10)));
        cb.record_failure();
        cb.record_failure();
        thread::sleep(Duration::from_millis(20));
        assert!(cb.is_call_permitted());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn failures_outside_the_window_do_not_accumulate() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::from_millis(20),
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        });

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        thread::sleep(Duration::from_millis(30));

        // The window has lapsed since the last failure, so this one starts
        // a fresh count instead of tripping the breaker at 3.
        cb.record_failure();
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn resource_registry_runs_in_priority_order() {
        let registry = ResourceRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        registry.register(2, "storage", move || o1.lock().push("storage"));
        let o2 = Arc::clone(&order);
        registry.register(0, "detectors", move || o2.lock().push("detectors"));
        let o3 = Arc::clone(&order);
        registry.register(1, "preprocessor", move || o3.lock().push("preprocessor"));

        registry.shutdown();
        assert_eq!(*order.lock(), vec!["detectors", "preprocessor", "storage"]);
    }
}
