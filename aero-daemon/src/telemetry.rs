//! Telemetry publication
//!
//! The engine publishes one JSON line per tick through an injected
//! sink; this daemon routes it onto the dedicated `telemetry` tracing
//! target so operators can redirect or silence it with an EnvFilter
//! directive (e.g. `RUST_LOG=info,telemetry=off`).

use aero_core::TelemetrySink;

pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&self, line: &str) {
        tracing::info!(target: "telemetry", "{line}");
    }
}
