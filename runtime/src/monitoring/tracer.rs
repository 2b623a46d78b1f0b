/*!
 * Structured Tracing
 * Subscriber setup and spans around garbage collections
 *
 * Environment variables:
 * - RUST_LOG: log level filter (default: info)
 * - VM_TRACE_JSON: `1` or `true` switches to JSON output
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

use crate::core::types::Pid;

/// Collections slower than this are reported as warnings
const SLOW_GC_MILLIS: u128 = 10;

/// Install the global subscriber
///
/// # Panics
/// If a global subscriber is already installed; see `try_init_tracing`.
pub fn init_tracing() {
    if !try_init_tracing() {
        panic!("a global tracing subscriber is already installed");
    }
}

/// Install the global subscriber; `false` if one was already installed
pub fn try_init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = json_requested(), "Structured tracing initialized");
    }
    installed
}

fn json_requested() -> bool {
    std::env::var("VM_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

/// Generate a unique trace ID for correlating one collection's events
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one scavenge of one process
pub struct GcSpan {
    span: tracing::Span,
    start: Instant,
    pid: Pid,
    trace_id: String,
}

impl GcSpan {
    pub fn new(pid: Pid, reason: &'static str) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "gc",
            trace_id = %trace_id,
            pid = pid,
            reason = reason,
            freed = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            pid,
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn record_freed(&self, freed: usize) {
        self.span.record("freed", freed);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for GcSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration.as_millis() > SLOW_GC_MILLIS {
            warn!(
                trace_id = %self.trace_id,
                pid = self.pid,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow scavenge detected"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                pid = self.pid,
                duration_us = duration.as_micros() as u64,
                "scavenge completed"
            );
        }
    }
}
