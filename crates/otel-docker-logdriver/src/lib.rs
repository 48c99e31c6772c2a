//! # OTLP Docker Logging Driver
//!
//! This crate implements the core of a Docker logging-driver plugin that
//! forwards container logs to an OpenTelemetry collector over OTLP.
//!
//! ## Overview
//!
//! The Docker daemon hands the plugin one FIFO per container. Each FIFO
//! carries length-prefixed protobuf frames, one per log line. The driver
//! decodes the frames, maps them to OTLP log records, and emits them
//! through a batching OTLP exporter (gRPC or HTTP/protobuf).
//!
//! ## Architecture
//!
//! ```text
//!   Docker daemon
//!       │ StartLogging / StopLogging (HTTP over unix socket)
//!       v
//!   ┌─────────────┐
//!   │   Plugin    │ (handshake endpoints)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │   Driver    │ (one consumption task per container FIFO)
//!   └──────┬──────┘
//!          │ frames
//!          v
//!   ┌─────────────┐
//!   │   Mapper    │ (severity, body, docker.* attributes)
//!   └──────┬──────┘
//!          │ records
//!          v
//!   ┌─────────────┐
//!   │  Transport  │ (OTLP batch exporter + resource)
//!   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: transport configuration from OTel environment variables
//! - [`container`]: container metadata and per-container log options
//! - [`driver`]: stream lifecycle management and consumption tasks
//! - [`frames`]: Docker log-frame codec with self-resynchronizing decoder
//! - [`mapper`]: frame to normalized-record mapping
//! - [`plugin`]: Docker plugin handshake over a unix socket
//! - [`transport`]: OTLP transport configurator and record emitter

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Transport configuration from environment variables
pub mod config;

/// Container metadata and per-container log options
pub mod container;

/// Stream lifecycle management - registry and consumption tasks
pub mod driver;

/// Error types for driver, transport, and plugin failures
pub mod error;

/// Docker log-frame codec and self-resynchronizing decoder
pub mod frames;

/// Custom tracing formatter for plugin process logs
pub mod logger;

/// Frame to normalized-record mapping
pub mod mapper;

/// Docker plugin handshake endpoints over a unix socket
pub mod plugin;

/// OTLP transport configuration and record emission
pub mod transport;

/// Driver name reported as the OTLP service name and instrumentation scope.
pub const DRIVER_NAME: &str = "otel-docker-logging-driver";

/// Driver version (from the crate manifest), reported at startup.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs build information at INFO level.
///
/// Called once during plugin startup so the running version is recorded in
/// the daemon's plugin logs.
pub fn log_build_info() {
    tracing::info!("{} version: {}", DRIVER_NAME, DRIVER_VERSION);
}
