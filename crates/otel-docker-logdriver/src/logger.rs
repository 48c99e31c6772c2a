//! Custom tracing formatter for the plugin process.
//!
//! Docker surfaces a plugin's stdout/stderr inside the daemon's own log
//! stream, interleaved with everything else the daemon prints. Prefixing
//! every line makes the driver's output easy to grep out:
//!
//! ```text
//! OTEL_LOGDRIVER | INFO | otel-docker-logging-driver version: 0.1.0
//! OTEL_LOGDRIVER | WARN | per-container endpoint override not supported; using plugin-level endpoint container_id=cid123
//! ```
//!
//! Active spans and their fields are included between the level and the
//! message, from root to current.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Prefix attached to every log line the plugin writes.
pub const LOG_PREFIX: &str = "OTEL_LOGDRIVER";

/// Log formatter producing `OTEL_LOGDRIVER | LEVEL | message` lines.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        // Span context from root to current, fields in braces.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                let fields = &ext
                    .get::<FormattedFields<N>>()
                    .expect("span fields are recorded on creation");
                if !fields.is_empty() {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
