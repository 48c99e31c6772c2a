//! Error types for the logging driver.
//!
//! Three concerns, three enums:
//! - [`DriverError`]: start/stop failures reported back to the Docker daemon
//! - [`TransportError`]: OTLP transport construction failures (fatal at startup)
//! - [`PluginError`]: plugin socket setup failures (fatal at startup)
//!
//! Transient decode errors are deliberately absent - the frame decoder
//! recovers from them internally and they never cross a module boundary.

use std::path::PathBuf;

/// Errors surfaced to the Docker daemon by `StartLogging`/`StopLogging`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A consumer is already registered for this stream key. Duplicate
    /// starts are rejected, not silently accepted.
    #[error("logger for {0:?} already exists")]
    AlreadyRegistered(String),

    /// The container's log stream could not be opened.
    #[error("open log stream {path:?}: {source}")]
    OpenStream {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors constructing the OTLP transport. All of these abort startup:
/// the plugin must not serve streams with a half-configured transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// TLS material (CA bundle, client certificate, or client key) could
    /// not be read. Never downgraded to a plaintext or system-roots
    /// connection.
    #[error("read TLS material {path:?}: {source}")]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured outbound header has a name tonic cannot carry as gRPC
    /// metadata.
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    /// A configured outbound header has a non-ASCII or otherwise invalid
    /// value.
    #[error("invalid header value for {0:?}")]
    InvalidHeaderValue(String),

    /// The OTLP exporter itself could not be built.
    #[error("create otlp logs exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    /// The provider failed to shut down cleanly within the allotted time.
    #[error("shutdown logger provider: {0}")]
    Shutdown(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Errors binding the Docker plugin socket.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("create plugin socket directory {path:?}: {source}")]
    SocketDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remove stale plugin socket {path:?}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bind plugin socket {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
