//! Logging and tracing setup for the monitor.
//!
//! Structured logging through `tracing`, printed either as readable console
//! lines or as JSON for log shippers. Logs go to stderr so command output on
//! stdout stays clean.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Default to DEBUG instead of INFO
    pub verbose: bool,
}

impl LogConfig {
    fn level(&self) -> Level {
        if self.verbose { Level::DEBUG } else { Level::INFO }
    }

    /// Filter used when `RUST_LOG` is unset.
    fn default_directive(&self) -> String {
        format!("etl_monitor={}", self.level().as_str().to_lowercase())
    }
}

/// Install the global subscriber. Call once, after configuration is loaded.
/// `RUST_LOG` takes precedence over the level chosen here.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    // Exactly one of the two layers is present.
    let json = config.json.then(|| {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let console = (!config.json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(console)
        .init();
}

/// Per-job rate limit for the "still running" line logged on poll ticks.
///
/// Each job id gets its own window, so a job switched in through
/// `update_job_id` logs its first progress line straight away.
pub struct LogThrottle {
    interval: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    /// True if `job_id` has not logged within the interval. Concurrent poll
    /// tasks for the same job share one window; only one of them wins it.
    pub fn should_log(&self, job_id: &str) -> bool {
        let now = Instant::now();
        let mut last_logged = self.last_logged.lock().unwrap_or_else(|e| e.into_inner());

        match last_logged.get(job_id) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                last_logged.insert(job_id.to_string(), now);
                true
            }
        }
    }

    /// Drop every window, e.g. when tracking starts over.
    pub fn reset(&self) {
        self.last_logged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
