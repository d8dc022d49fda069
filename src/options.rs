use crate::record::{Properties, PropertyValue};
use crate::severity::LevelToken;
use std::time::Duration;

/// Options every transport understands, independent of its backend.
///
/// **Fields**
/// - `level`: least severe level forwarded; `None` forwards everything.
/// - `handle_exceptions`: whether the transport reports process-level
///   errors at all.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportOptions {
    pub level: Option<LevelToken>,
    pub handle_exceptions: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self { level: None, handle_exceptions: true }
    }
}

/// Construction options of [`crate::transport::AppInsightsTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct AppInsightsOptions {
    pub instrumentation_key: String,
    /// Attached to every forwarded item; wins over record properties.
    pub custom_fields: Properties,
    pub base: TransportOptions,
    /// Report panics in addition to unhandled rejections.
    pub report_sync_uncaught: bool,
    /// Passed through to the telemetry client when set.
    pub max_batch_interval: Option<Duration>,
}

impl AppInsightsOptions {
    pub fn new(instrumentation_key: impl Into<String>) -> Self {
        Self {
            instrumentation_key: instrumentation_key.into(),
            custom_fields: Properties::new(),
            base: TransportOptions::default(),
            report_sync_uncaught: true,
            max_batch_interval: None,
        }
    }

    pub fn custom_field(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    pub fn level(mut self, level: LevelToken) -> Self {
        self.base.level = Some(level);
        self
    }

    pub fn handle_exceptions(mut self, enabled: bool) -> Self {
        self.base.handle_exceptions = enabled;
        self
    }

    pub fn report_sync_uncaught(mut self, enabled: bool) -> Self {
        self.report_sync_uncaught = enabled;
        self
    }

    pub fn max_batch_interval(mut self, interval: Duration) -> Self {
        self.max_batch_interval = Some(interval);
        self
    }
}
