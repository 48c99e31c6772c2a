//! OTLP transport configuration.
//!
//! Turns the plugin-level [`Config`] into a ready-to-use export channel:
//! protocol selection, endpoint resolution, outbound headers, compression,
//! file-based TLS, and the resource descriptor attached to every record.
//! Batching, retry, and the wire encoding itself are owned by the
//! `opentelemetry-otlp` exporter; this module only configures it.
//!
//! # Endpoint forms
//!
//! | configured                  | gRPC resolves to            | HTTP resolves to                       |
//! |-----------------------------|-----------------------------|----------------------------------------|
//! | `https://collector:4318`    | passed through              | `https://collector:4318/v1/logs`       |
//! | `https://collector/custom`  | passed through              | passed through (path kept)             |
//! | `collector:4317`            | `https://collector:4317`    | `https://collector:4317/v1/logs`       |
//! | `collector:4317` + insecure | `http://collector:4317`     | `http://collector:4317/v1/logs`        |
//!
//! Construction failures are fatal to startup: the plugin must not serve
//! streams with a half-configured transport.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use opentelemetry::logs::LoggerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{
    Compression as OtlpCompression, LogExporter, Protocol as OtlpProtocol, WithExportConfig,
    WithHttpConfig, WithTonicConfig,
};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::Resource;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use url::Url;

use crate::config::{Compression, Config, Protocol};
use crate::error::TransportError;
use crate::DRIVER_NAME;

pub mod emitter;

pub use emitter::{OtlpEmitter, RecordEmitter};

/// Standard OTLP logs resource path, appended when an HTTP endpoint URL
/// carries no path of its own.
pub const LOGS_HTTP_PATH: &str = "/v1/logs";

/// The configured export channel plus its resource descriptor.
///
/// Shared read-only by every stream consumption task (via the emitters it
/// hands out) and closed exactly once at process teardown.
#[derive(Debug)]
pub struct ResolvedTransport {
    provider: SdkLoggerProvider,
}

impl ResolvedTransport {
    /// Creates an emitter backed by this transport.
    #[must_use]
    pub fn emitter(&self) -> OtlpEmitter {
        OtlpEmitter::new(self.provider.logger(DRIVER_NAME))
    }

    /// Flushes queued records and shuts the export pipeline down.
    ///
    /// Consumes the transport, so the graceful-shutdown operation can only
    /// run once per process lifetime.
    pub fn shutdown(self, timeout: Duration) -> Result<(), TransportError> {
        self.provider.shutdown_with_timeout(timeout)?;
        Ok(())
    }
}

/// Builds the export transport described by `config`.
pub fn resolve_transport(config: &Config) -> Result<ResolvedTransport, TransportError> {
    let exporter = match config.protocol {
        Protocol::Http => build_http_exporter(config)?,
        // Backwards-compatible default is gRPC, even when the endpoint
        // carries an http(s) scheme.
        Protocol::Grpc | Protocol::Unset => build_grpc_exporter(config)?,
    };

    let provider = SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(build_resource())
        .build();

    Ok(ResolvedTransport { provider })
}

fn build_grpc_exporter(config: &Config) -> Result<LogExporter, TransportError> {
    let mut builder = LogExporter::builder()
        .with_tonic()
        .with_endpoint(resolve_grpc_endpoint(&config.endpoint, config.insecure));

    if !config.headers.is_empty() {
        builder = builder.with_metadata(build_metadata(&config.headers)?);
    }
    if config.compression == Compression::Gzip {
        builder = builder.with_compression(OtlpCompression::Gzip);
    }
    if !config.insecure {
        if let Some(tls) = load_tls_config(config)? {
            builder = builder.with_tls_config(tls);
        }
    }

    Ok(builder.build()?)
}

fn build_http_exporter(config: &Config) -> Result<LogExporter, TransportError> {
    let mut builder = LogExporter::builder()
        .with_http()
        .with_protocol(OtlpProtocol::HttpBinary)
        .with_endpoint(resolve_http_endpoint(&config.endpoint, config.insecure));

    if !config.headers.is_empty() {
        builder = builder.with_headers(config.headers.clone());
    }
    // Compression and file-based TLS are currently applied only for the
    // gRPC transport; the HTTP transport relies on scheme-based TLS with
    // system roots.

    Ok(builder.build()?)
}

/// Resolves the endpoint for the gRPC transport. tonic needs a
/// scheme-qualified URI; `http://` doubles as the plaintext signal, so the
/// insecure flag picks the scheme for bare `host:port` endpoints and
/// downgrades an `https` URL.
fn resolve_grpc_endpoint(endpoint: &str, insecure: bool) -> String {
    if let Some(mut url) = parse_http_url(endpoint) {
        if insecure && url.scheme() == "https" {
            let _ = url.set_scheme("http");
        }
        return url.to_string();
    }
    format!("{}://{endpoint}", scheme_for(insecure))
}

/// Resolves the endpoint for the HTTP transport, appending the standard
/// logs resource path when the URL has none.
fn resolve_http_endpoint(endpoint: &str, insecure: bool) -> String {
    if let Some(mut url) = parse_http_url(endpoint) {
        if insecure && url.scheme() == "https" {
            let _ = url.set_scheme("http");
        }
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(LOGS_HTTP_PATH);
        }
        return url.to_string();
    }
    format!("{}://{endpoint}{LOGS_HTTP_PATH}", scheme_for(insecure))
}

fn parse_http_url(endpoint: &str) -> Option<Url> {
    let url = Url::parse(endpoint).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn scheme_for(insecure: bool) -> &'static str {
    if insecure {
        "http"
    } else {
        "https"
    }
}

fn build_metadata(headers: &HashMap<String, String>) -> Result<MetadataMap, TransportError> {
    let mut metadata = MetadataMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeaderName(name.clone()))?;
        let value: MetadataValue<Ascii> = value
            .parse()
            .map_err(|_| TransportError::InvalidHeaderValue(name.clone()))?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Loads file-based TLS material for the gRPC transport.
///
/// A configured CA bundle that cannot be read is a hard configuration
/// error - the transport is never silently downgraded to system roots.
/// A client certificate and key are loaded as a client identity when both
/// are configured. rustls floors the handshake at TLS 1.2.
fn load_tls_config(config: &Config) -> Result<Option<ClientTlsConfig>, TransportError> {
    let Some(ca_path) = config.ca_file.as_deref() else {
        return Ok(None);
    };

    let ca_pem = read_tls_material(ca_path)?;
    let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca_pem));

    if let (Some(cert_path), Some(key_path)) = (
        config.client_cert_file.as_deref(),
        config.client_key_file.as_deref(),
    ) {
        let cert_pem = read_tls_material(cert_path)?;
        let key_pem = read_tls_material(key_path)?;
        tls = tls.identity(Identity::from_pem(cert_pem, key_pem));
    }

    Ok(Some(tls))
}

fn read_tls_material(path: &Path) -> Result<Vec<u8>, TransportError> {
    fs::read(path).map_err(|source| TransportError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

/// Process-default resource attributes merged with the fixed service
/// identity and the running executable's name.
fn build_resource() -> Resource {
    Resource::builder()
        .with_service_name(DRIVER_NAME)
        .with_attribute(KeyValue::new(
            "process.executable.name",
            std::env::args().next().unwrap_or_default(),
        ))
        .build()
}
