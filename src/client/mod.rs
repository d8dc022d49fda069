//! Seam between the transport and the telemetry SDK.
//!
//! The transport only ever talks to a [`TelemetryClient`] obtained once
//! from a [`TelemetryProvider`]. [`memory`] records calls in process;
//! `http` (feature `http`) ships envelopes to the ingestion endpoint.

use crate::error::ClientError;
use crate::record::Properties;
use crate::reporter::ProcessError;
use crate::severity::SeverityLevel;
use std::sync::Arc;
use std::time::Duration;

pub mod envelope;
pub mod memory;

#[cfg(feature = "http")]
pub mod http;

/// A log line as the telemetry service sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceTelemetry {
    pub message: String,
    pub severity: SeverityLevel,
    pub properties: Properties,
}

/// An incoming HTTP request.
///
/// `duration` is in milliseconds; `None` when the producer's value could
/// not be read as an integer.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTelemetry {
    pub name: String,
    pub url: String,
    pub duration: Option<i64>,
    pub result_code: String,
    pub success: bool,
    pub source: Option<String>,
    pub properties: Properties,
}

/// An error that escaped to the process level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTelemetry {
    pub exception: ProcessError,
    pub properties: Properties,
}

/// Initialization contract of a telemetry client.
///
/// Mirrors the SDK's fluent setup: every automatic collector starts
/// enabled and must be switched off explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSetup {
    pub instrumentation_key: String,
    pub auto_collect_console: bool,
    pub auto_collect_exceptions: bool,
    pub auto_collect_requests: bool,
    pub auto_dependency_correlation: bool,
    /// Upper bound between two sends of queued items, if overridden.
    pub max_batch_interval: Option<Duration>,
}

impl ClientSetup {
    pub fn new(instrumentation_key: impl Into<String>) -> Self {
        ClientSetup {
            instrumentation_key: instrumentation_key.into(),
            auto_collect_console: true,
            auto_collect_exceptions: true,
            auto_collect_requests: true,
            auto_dependency_correlation: true,
            max_batch_interval: None,
        }
    }

    pub fn set_auto_collect_console(mut self, enabled: bool) -> Self {
        self.auto_collect_console = enabled;
        self
    }

    pub fn set_auto_collect_exceptions(mut self, enabled: bool) -> Self {
        self.auto_collect_exceptions = enabled;
        self
    }

    pub fn set_auto_collect_requests(mut self, enabled: bool) -> Self {
        self.auto_collect_requests = enabled;
        self
    }

    pub fn set_auto_dependency_correlation(mut self, enabled: bool) -> Self {
        self.auto_dependency_correlation = enabled;
        self
    }

    pub fn set_max_batch_interval(mut self, interval: Option<Duration>) -> Self {
        self.max_batch_interval = interval;
        self
    }

    /// True if any automatic collector is still switched on.
    pub fn auto_collects(&self) -> bool {
        self.auto_collect_console
            || self.auto_collect_exceptions
            || self.auto_collect_requests
            || self.auto_dependency_correlation
    }
}

/// Fire-and-forget handle to the telemetry service.
///
/// None of the `track_*` calls report delivery: transmission happens in
/// the background and its failures stay inside the client.
pub trait TelemetryClient: Send + Sync {
    fn track_trace(&self, telemetry: TraceTelemetry);

    fn track_request(&self, telemetry: RequestTelemetry);

    fn track_exception(&self, telemetry: ExceptionTelemetry);

    /// Ask the client to send whatever it has queued.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) {}
}

/// Starts telemetry clients from a [`ClientSetup`].
pub trait TelemetryProvider {
    fn start(&self, setup: ClientSetup) -> Result<Arc<dyn TelemetryClient>, ClientError>;
}
