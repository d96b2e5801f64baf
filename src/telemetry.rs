//! Application telemetry events and sinks.
//!
//! Extraction is a local-first batch job, but it still benefits from
//! lightweight telemetry to support debugging and to capture operational
//! signals: the active schema version, batch commit progress, and how long
//! the run spent suspended on rate limits.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured telemetry event emitted during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Records the current database schema version after migrations apply.
    SchemaVersionRecorded {
        /// Diesel migration version string (e.g. `20260701000000`).
        schema_version: String,
    },
    /// A run started against a repository.
    RunStarted {
        /// `owner/name` of the repository being extracted.
        repository: String,
        /// Run mode in string form (`full`, `incremental`, ...).
        mode: String,
    },
    /// A batch of pull requests was durably committed.
    BatchCommitted {
        /// Number of pull requests in the batch.
        pull_requests: u64,
        /// Highest pull request number in the batch.
        highest_pr_number: i64,
        /// Total rows written for the batch across all tables.
        rows: u64,
    },
    /// The run spent time suspended waiting for a rate limit reset.
    RateLimitWaited {
        /// Seconds spent suspended.
        seconds: u64,
    },
    /// A run finished, successfully or not.
    RunFinished {
        /// Final state (`completed`, `cancelled`, or `failed`).
        outcome: String,
        /// Pull requests fully committed this run.
        pull_requests: u64,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
///
/// This is intended for local debugging and is not transmitted anywhere.
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    //! Recording sink for assertions in tests.

    use std::sync::Mutex;

    use super::{TelemetryEvent, TelemetrySink};

    /// Sink that stores every event for later inspection.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingSink {
        /// Drains and returns the recorded events.
        ///
        /// # Panics
        ///
        /// Panics when the internal mutex is poisoned.
        #[must_use]
        pub fn take(&self) -> Vec<TelemetryEvent> {
            self.events
                .lock()
                .expect("events mutex should be available")
                .drain(..)
                .collect()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: TelemetryEvent) {
            self.events
                .lock()
                .expect("events mutex should be available")
                .push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::{TelemetryEvent, TelemetrySink};

    #[test]
    fn recording_sink_captures_events() {
        let sink = RecordingSink::default();
        sink.record(TelemetryEvent::BatchCommitted {
            pull_requests: 3,
            highest_pr_number: 17,
            rows: 42,
        });

        assert_eq!(
            sink.take(),
            vec![TelemetryEvent::BatchCommitted {
                pull_requests: 3,
                highest_pr_number: 17,
                rows: 42,
            }]
        );
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = TelemetryEvent::RunStarted {
            repository: "octo/cat".to_owned(),
            mode: "incremental".to_owned(),
        };
        let serialised = serde_json::to_string(&event).expect("event should serialize");
        assert!(serialised.contains("\"type\":\"run_started\""));
    }
}
