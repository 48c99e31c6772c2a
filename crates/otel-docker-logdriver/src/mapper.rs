//! Mapping from decoded log frames to normalized, transport-agnostic
//! records.
//!
//! [`map_entry`] is a pure function: no I/O, no shared state. Everything
//! the record carries comes from the frame, the container metadata, and
//! the per-container options resolved at stream start.

use std::time::SystemTime;

use crate::container::{ContainerInfo, ContainerOptions};
use crate::frames::LogEntry;

/// Attribute key for the full container ID.
pub const ATTR_CONTAINER_ID: &str = "docker.container.id";

/// Attribute key for the container display name.
pub const ATTR_CONTAINER_NAME: &str = "docker.container.name";

/// Attribute key for the image name.
pub const ATTR_IMAGE_NAME: &str = "docker.image.name";

/// Attribute key for the origin stream (`stdout`/`stderr`).
pub const ATTR_STREAM: &str = "docker.stream";

/// Prefix for propagated container labels. Distinct from every base
/// attribute key, so base and label attributes cannot collide.
pub const LABEL_PREFIX: &str = "docker.label.";

/// Severity derived from the origin stream. `stderr` maps to error,
/// everything else to info; no other levels are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSeverity {
    Info,
    Error,
}

/// A mapped log record, immutable once constructed.
///
/// Handed to the record emitter and not retained by the driver afterward.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Emission time from the frame, nanoseconds since the Unix epoch.
    pub time_nano: i64,
    /// Wall-clock time of mapping.
    pub observed_at: SystemTime,
    pub severity: RecordSeverity,
    /// Line bytes as text, unmodified apart from UTF-8 replacement of
    /// invalid sequences. No trimming, no truncation.
    pub body: String,
    /// Attributes in insertion order: base attributes first, then any
    /// propagated labels.
    pub attributes: Vec<(String, String)>,
}

/// Maps one frame to a normalized record.
#[must_use]
pub fn map_entry(
    entry: &LogEntry,
    info: &ContainerInfo,
    options: &ContainerOptions,
) -> NormalizedRecord {
    let severity = if entry.source == "stderr" {
        RecordSeverity::Error
    } else {
        RecordSeverity::Info
    };

    let mut attributes = vec![
        (ATTR_CONTAINER_ID.to_string(), info.container_id.clone()),
        (ATTR_CONTAINER_NAME.to_string(), info.display_name().to_string()),
        (ATTR_IMAGE_NAME.to_string(), info.container_image_name.clone()),
        (ATTR_STREAM.to_string(), entry.source.clone()),
    ];

    if options.include_labels {
        for (key, value) in &info.container_labels {
            attributes.push((format!("{LABEL_PREFIX}{key}"), value.clone()));
        }
    }

    NormalizedRecord {
        time_nano: entry.time_nano,
        observed_at: SystemTime::now(),
        severity,
        body: String::from_utf8_lossy(&entry.line).into_owned(),
        attributes,
    }
}
