//! Transport configuration from OpenTelemetry environment variables.
//!
//! Configuration is read once at plugin startup and is immutable afterward.
//! Signal-specific variables (`OTEL_EXPORTER_OTLP_LOGS_*`) take precedence
//! over the generic `OTEL_EXPORTER_OTLP_*` variants; empty values count as
//! unset.
//!
//! | Variable (LOGS_ variant first)           | Meaning                         |
//! |------------------------------------------|---------------------------------|
//! | `..._ENDPOINT`                           | collector endpoint              |
//! | `..._PROTOCOL`                           | `grpc` or `http/protobuf`       |
//! | `..._INSECURE`                           | `true` disables transport TLS   |
//! | `..._HEADERS`                            | `k=v,k2=v2` outbound headers    |
//! | `OTEL_EXPORTER_OTLP_LOGS_COMPRESSION`    | `gzip` or unset                 |
//! | `..._CERTIFICATE`                        | CA bundle path (PEM)            |
//! | `..._CLIENT_CERTIFICATE` / `..._CLIENT_KEY` | client identity paths (PEM)  |
//!
//! The endpoint may be a full `http(s)://` URL or a bare `host:port`; the
//! transport configurator decides what to do with each form.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Default collector endpoint when no endpoint variable is set.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Wire protocol used to reach the collector.
///
/// `Unset` means no protocol variable was present; the transport
/// configurator resolves it to the back-compatible default (gRPC),
/// independent of any scheme in the endpoint string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Unset,
    Grpc,
    Http,
}

/// Payload compression toward the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

/// Plugin-level transport configuration.
///
/// Constructed once from the environment at startup and shared read-only
/// with the transport configurator. Per-container `--log-opt` overrides of
/// these settings are not supported and are ignored with a diagnostic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Collector endpoint: `http(s)://host:port[/path]` or bare `host:port`.
    pub endpoint: String,
    /// Explicit protocol selection, or [`Protocol::Unset`] to auto-detect.
    pub protocol: Protocol,
    /// Disable transport-level TLS regardless of endpoint scheme.
    pub insecure: bool,
    /// Static headers attached to every export call.
    pub headers: HashMap<String, String>,
    /// Compression toward the collector.
    pub compression: Compression,
    /// CA bundle used to verify the collector (gRPC transport only).
    pub ca_file: Option<PathBuf>,
    /// Client certificate for mutual TLS, paired with [`Config::client_key_file`].
    pub client_cert_file: Option<PathBuf>,
    /// Client private key for mutual TLS.
    pub client_key_file: Option<PathBuf>,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            endpoint: logs_env("ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            protocol: normalize_protocol(logs_env("PROTOCOL").as_deref().unwrap_or_default()),
            insecure: logs_env("INSECURE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or_default(),
            headers: parse_headers(logs_env("HEADERS").as_deref().unwrap_or_default()),
            compression: normalize_compression(
                env_non_empty("OTEL_EXPORTER_OTLP_LOGS_COMPRESSION")
                    .as_deref()
                    .unwrap_or_default(),
            ),
            ca_file: logs_env("CERTIFICATE").map(PathBuf::from),
            client_cert_file: logs_env("CLIENT_CERTIFICATE").map(PathBuf::from),
            client_key_file: logs_env("CLIENT_KEY").map(PathBuf::from),
        }
    }
}

/// Reads `OTEL_EXPORTER_OTLP_LOGS_<suffix>`, falling back to the generic
/// `OTEL_EXPORTER_OTLP_<suffix>`.
fn logs_env(suffix: &str) -> Option<String> {
    env_non_empty(&format!("OTEL_EXPORTER_OTLP_LOGS_{suffix}"))
        .or_else(|| env_non_empty(&format!("OTEL_EXPORTER_OTLP_{suffix}")))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Maps the OTel protocol variable to a [`Protocol`].
///
/// Accepts the standard `http/protobuf` spelling plus the aliases seen in
/// the wild; anything unrecognized resolves to [`Protocol::Unset`].
fn normalize_protocol(raw: &str) -> Protocol {
    match raw.trim().to_ascii_lowercase().as_str() {
        "grpc" => Protocol::Grpc,
        "http" | "http/protobuf" | "http_proto" | "http-protobuf" => Protocol::Http,
        _ => Protocol::Unset,
    }
}

/// Any value other than a case variant of `gzip` leaves compression off.
fn normalize_compression(raw: &str) -> Compression {
    if raw.trim().eq_ignore_ascii_case("gzip") {
        Compression::Gzip
    } else {
        Compression::None
    }
}

/// Parses `k=v,k2=v2` header lists. Entries without `=` are dropped;
/// values may themselves contain `=`.
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|part| {
            let (k, v) = part.trim().split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
        "OTEL_EXPORTER_OTLP_ENDPOINT",
        "OTEL_EXPORTER_OTLP_LOGS_PROTOCOL",
        "OTEL_EXPORTER_OTLP_PROTOCOL",
        "OTEL_EXPORTER_OTLP_LOGS_INSECURE",
        "OTEL_EXPORTER_OTLP_INSECURE",
        "OTEL_EXPORTER_OTLP_LOGS_HEADERS",
        "OTEL_EXPORTER_OTLP_HEADERS",
        "OTEL_EXPORTER_OTLP_LOGS_COMPRESSION",
        "OTEL_EXPORTER_OTLP_LOGS_CERTIFICATE",
        "OTEL_EXPORTER_OTLP_CERTIFICATE",
        "OTEL_EXPORTER_OTLP_LOGS_CLIENT_CERTIFICATE",
        "OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE",
        "OTEL_EXPORTER_OTLP_LOGS_CLIENT_KEY",
        "OTEL_EXPORTER_OTLP_CLIENT_KEY",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_normalize_protocol() {
        let cases = [
            ("", Protocol::Unset),
            ("grpc", Protocol::Grpc),
            ("GRPC", Protocol::Grpc),
            ("http", Protocol::Http),
            ("HTTP/PROTOBUF", Protocol::Http),
            ("http-protobuf", Protocol::Http),
            ("http_proto", Protocol::Http),
            ("something-else", Protocol::Unset),
        ];
        for (input, want) in cases {
            assert_eq!(normalize_protocol(input), want, "input {input:?}");
        }
    }

    #[test]
    fn test_normalize_compression() {
        assert_eq!(normalize_compression("gzip"), Compression::Gzip);
        assert_eq!(normalize_compression("GZIP"), Compression::Gzip);
        assert_eq!(normalize_compression(""), Compression::None);
        assert_eq!(normalize_compression("snappy"), Compression::None);
    }

    #[test]
    fn test_parse_headers_empty() {
        assert!(parse_headers("").is_empty());
    }

    #[test]
    fn test_parse_headers_values_may_contain_equals() {
        let headers = parse_headers("a=b, c=d ,e=f=g");
        assert_eq!(headers.len(), 3);
        assert_eq!(headers["a"], "b");
        assert_eq!(headers["c"], "d");
        assert_eq!(headers["e"], "f=g");
    }

    #[test]
    fn test_parse_headers_drops_malformed_entries() {
        let headers = parse_headers("no-separator,k=v,=orphan");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["k"], "v");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.protocol, Protocol::Unset);
        assert!(!config.insecure);
        assert!(config.headers.is_empty());
        assert_eq!(config.compression, Compression::None);
        assert!(config.ca_file.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_logs_variables_win() {
        clear_env();
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", "https://collector:4318");
        env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "https://ignored:4317");
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_PROTOCOL", "http/protobuf");
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_INSECURE", "true");
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_HEADERS", "k=v,x=y");
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_COMPRESSION", "gzip");

        let config = Config::from_env();
        assert_eq!(config.endpoint, "https://collector:4318");
        assert_eq!(config.protocol, Protocol::Http);
        assert!(config.insecure);
        assert_eq!(config.headers.len(), 2);
        assert_eq!(config.headers["k"], "v");
        assert_eq!(config.headers["x"], "y");
        assert_eq!(config.compression, Compression::Gzip);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_generic_fallback() {
        clear_env();
        env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317");
        env::set_var("OTEL_EXPORTER_OTLP_PROTOCOL", "grpc");
        env::set_var("OTEL_EXPORTER_OTLP_INSECURE", "TRUE");
        env::set_var("OTEL_EXPORTER_OTLP_HEADERS", "a=b");

        let config = Config::from_env();
        assert_eq!(config.endpoint, "collector:4317");
        assert_eq!(config.protocol, Protocol::Grpc);
        assert!(config.insecure);
        assert_eq!(config.headers["a"], "b");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_empty_value_counts_as_unset() {
        clear_env();
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", "");
        env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317");

        let config = Config::from_env();
        assert_eq!(config.endpoint, "collector:4317");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_tls_paths() {
        clear_env();
        env::set_var("OTEL_EXPORTER_OTLP_CERTIFICATE", "/etc/certs/ca.pem");
        env::set_var(
            "OTEL_EXPORTER_OTLP_LOGS_CLIENT_CERTIFICATE",
            "/etc/certs/client.pem",
        );
        env::set_var("OTEL_EXPORTER_OTLP_LOGS_CLIENT_KEY", "/etc/certs/client.key");

        let config = Config::from_env();
        assert_eq!(config.ca_file, Some(PathBuf::from("/etc/certs/ca.pem")));
        assert_eq!(
            config.client_cert_file,
            Some(PathBuf::from("/etc/certs/client.pem"))
        );
        assert_eq!(
            config.client_key_file,
            Some(PathBuf::from("/etc/certs/client.key"))
        );
        clear_env();
    }
}
