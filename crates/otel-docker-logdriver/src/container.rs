//! Container metadata and per-container log options.
//!
//! [`ContainerInfo`] is the subset of Docker's `logger.Info` payload the
//! driver uses; it arrives as JSON in the `StartLogging` request and stays
//! attached to the stream registration for the lifetime of the stream.
//!
//! [`ContainerOptions`] is the fixed schema of recognized `--log-opt` keys.
//! It is validated once per stream start; unsupported transport overrides
//! are diagnosed there instead of being probed per frame.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

/// `--log-opt` key enabling container-label propagation onto records.
pub const OPT_INCLUDE_LABELS: &str = "include-labels";

/// Unsupported `--log-opt` key: per-container endpoint override.
pub const OPT_ENDPOINT: &str = "endpoint";

/// Unsupported `--log-opt` key: per-container headers override.
pub const OPT_HEADERS: &str = "headers";

/// Static container metadata from the Docker daemon.
///
/// Unknown fields in the daemon payload are ignored; missing fields
/// default to empty so older daemons keep working.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    /// Per-container `--log-opt` key/value pairs.
    #[serde(rename = "Config")]
    pub config: HashMap<String, String>,
    /// Full container ID.
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    /// Container name as reported by the daemon (leading `/` included).
    #[serde(rename = "ContainerName")]
    pub container_name: String,
    /// Image name the container was created from.
    #[serde(rename = "ContainerImageName")]
    pub container_image_name: String,
    /// Container labels at creation time.
    #[serde(rename = "ContainerLabels")]
    pub container_labels: HashMap<String, String>,
}

impl ContainerInfo {
    /// Display name of the container.
    ///
    /// The daemon reports names with a leading `/`; Docker's own naming
    /// rule strips it.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.container_name.strip_prefix('/').unwrap_or(&self.container_name)
    }
}

/// Recognized per-container log options, validated once per stream start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Attach every container label to each record under the label prefix.
    pub include_labels: bool,
}

impl ContainerOptions {
    /// Parses the `--log-opt` map for one container.
    ///
    /// `include-labels` is affirmative for a case-insensitive `1`, `true`,
    /// or `yes`; any other value (or absence) leaves it off. Unsupported
    /// transport overrides (`endpoint`, `headers`) emit one diagnostic per
    /// stream start and are otherwise ignored - plugin-level transport
    /// configuration always wins.
    #[must_use]
    pub fn from_config(config: &HashMap<String, String>, container_id: &str) -> Self {
        let include_labels = config
            .get(OPT_INCLUDE_LABELS)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or_default();

        if config.contains_key(OPT_ENDPOINT) {
            warn!(
                container_id,
                "per-container endpoint override not supported; using plugin-level endpoint"
            );
        }
        if config.contains_key(OPT_HEADERS) {
            warn!(
                container_id,
                "per-container headers override not supported; using plugin-level headers"
            );
        }

        Self { include_labels }
    }
}
