//! OpenTelemetry setup: structured logs, traces, and provider metrics.
//!
//! Logs are always emitted as JSON on stdout. Traces and metrics are exported
//! over OTLP/gRPC only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! # Telemetry invariants
//!
//! - **No secret values or tokens** may appear in any span attribute, metric
//!   label, or log field. Secret names and issuers are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::init_telemetry;
