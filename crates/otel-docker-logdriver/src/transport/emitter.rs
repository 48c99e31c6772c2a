//! Record emission seam between the driver core and the export library.
//!
//! Consumption tasks talk to [`RecordEmitter`], not to an ambient global
//! provider: the transport is constructed once, and emitters are passed
//! into each task at creation time. Tests substitute a capturing
//! implementation at the same seam.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::logs::{AnyValue, LogRecord, Logger, Severity};
use opentelemetry_sdk::logs::SdkLogger;

use crate::mapper::{NormalizedRecord, RecordSeverity};

/// Emits one normalized record, fire-and-forget.
///
/// Batching, retry, and transmission belong to the implementation; the
/// driver core never waits on delivery.
pub trait RecordEmitter: Send + Sync {
    fn emit(&self, record: NormalizedRecord);
}

/// [`RecordEmitter`] backed by the OTLP batch export pipeline.
pub struct OtlpEmitter {
    logger: SdkLogger,
}

impl OtlpEmitter {
    pub(crate) fn new(logger: SdkLogger) -> Self {
        Self { logger }
    }
}

impl RecordEmitter for OtlpEmitter {
    fn emit(&self, record: NormalizedRecord) {
        let mut log = self.logger.create_log_record();
        log.set_timestamp(system_time_from_nanos(record.time_nano));
        log.set_observed_timestamp(record.observed_at);
        log.set_severity_number(severity_number(record.severity));
        log.set_severity_text(severity_text(record.severity));
        log.set_body(AnyValue::from(record.body));
        for (key, value) in record.attributes {
            log.add_attribute(key, value);
        }
        self.logger.emit(log);
    }
}

fn severity_number(severity: RecordSeverity) -> Severity {
    match severity {
        RecordSeverity::Info => Severity::Info,
        RecordSeverity::Error => Severity::Error,
    }
}

fn severity_text(severity: RecordSeverity) -> &'static str {
    match severity {
        RecordSeverity::Info => "INFO",
        RecordSeverity::Error => "ERROR",
    }
}

fn system_time_from_nanos(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
