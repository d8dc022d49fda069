use crate::client::{
    ClientSetup, RequestTelemetry, TelemetryClient, TelemetryProvider, TraceTelemetry,
};
use crate::error::{ClientError, UnknownLevelError};
use crate::options::{AppInsightsOptions, TransportOptions};
use crate::record::{LogRecord, Properties, RequestRecord, TraceRecord};
use crate::reporter::{ErrorChannel, ErrorReporter, ErrorRuntime};
use crate::severity::{LevelToken, SeverityLevel};
use crate::sink::{LogCallback, LogSink};
use std::sync::Arc;

/// [`LogSink`] forwarding records to an Application Insights client.
///
/// Every forwarded item carries the custom fields given at construction.
/// When a record brings its own value for one of those keys, the custom
/// field wins and a separate warning trace names the keys involved.
pub struct AppInsightsTransport {
    client: Arc<dyn TelemetryClient>,
    custom_fields: Properties,
    options: TransportOptions,
    reporter: Option<ErrorReporter>,
}

impl AppInsightsTransport {
    /// Start the telemetry client and subscribe the error reporter.
    ///
    /// **Parameters**
    /// - `options`: instrumentation key, custom fields and base options.
    /// - `provider`: started exactly once, with every automatic
    ///   collector and dependency correlation switched off since this
    ///   transport reports requests and exceptions itself.
    /// - `runtime`: where process-level errors are subscribed. Nothing
    ///   is subscribed when `handle_exceptions` is off; panics only when
    ///   `report_sync_uncaught` is on.
    ///
    /// **Returns**
    /// - `Err(ClientError)` if the provider refused the setup.
    pub fn new(
        options: AppInsightsOptions,
        provider: &dyn TelemetryProvider,
        runtime: Arc<dyn ErrorRuntime>,
    ) -> Result<Self, ClientError> {
        let setup = ClientSetup::new(options.instrumentation_key.clone())
            .set_auto_collect_console(false)
            .set_auto_collect_exceptions(false)
            .set_auto_collect_requests(false)
            .set_auto_dependency_correlation(false)
            .set_max_batch_interval(options.max_batch_interval);
        let client = provider.start(setup)?;

        let reporter = if options.base.handle_exceptions {
            let mut channels = vec![ErrorChannel::UnhandledRejection];
            if options.report_sync_uncaught {
                channels.push(ErrorChannel::UncaughtError);
            }
            Some(ErrorReporter::register(
                runtime,
                Arc::clone(&client),
                options.custom_fields.clone(),
                &channels,
            ))
        } else {
            None
        };

        Ok(Self {
            client,
            custom_fields: options.custom_fields,
            options: options.base,
            reporter,
        })
    }

    pub fn client(&self) -> &Arc<dyn TelemetryClient> {
        &self.client
    }

    pub fn custom_fields(&self) -> &Properties {
        &self.custom_fields
    }

    /// Stop reporting process-level errors. Forwarding keeps working.
    ///
    /// Also happens when the transport is dropped.
    pub fn dispose(&self) {
        if let Some(reporter) = &self.reporter {
            reporter.dispose();
        }
    }

    /// Custom field keys the record also supplies, request fields included.
    fn collisions<'a>(&self, record: &'a LogRecord) -> Vec<&'a str> {
        record
            .supplied_keys()
            .into_iter()
            .filter(|key| self.custom_fields.contains_key(*key))
            .collect()
    }

    fn merge(&self, mut properties: Properties) -> Properties {
        properties.extend(self.custom_fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        properties
    }

    fn warn_collisions(&self, record: &LogRecord) {
        let collided = self.collisions(record);
        if collided.is_empty() {
            return;
        }
        self.client.track_trace(TraceTelemetry {
            message: format!(
                "Predefined transport custom fields have overwritten: '{}'",
                collided.join(", ")
            ),
            severity: SeverityLevel::Warning,
            properties: self.custom_fields.clone(),
        });
    }

    fn forward_trace(&self, record: TraceRecord, severity: SeverityLevel) {
        self.client.track_trace(TraceTelemetry {
            message: record.message,
            severity,
            properties: self.merge(record.properties),
        });
    }

    fn forward_request(&self, record: RequestRecord) {
        self.client.track_request(RequestTelemetry {
            name: record.name,
            url: record.url,
            duration: record.duration.as_ref().and_then(|d| d.to_integer()),
            result_code: record.result_code.map(|c| c.to_string()).unwrap_or_default(),
            success: record.success.as_ref().map(|s| s.is_truthy()).unwrap_or(false),
            source: record.source,
            properties: self.merge(record.properties),
        });
    }
}

impl LogSink for AppInsightsTransport {
    fn log(&self, record: LogRecord, callback: LogCallback<'_>) -> Result<(), UnknownLevelError> {
        let token: LevelToken = record.level().parse()?;

        if let Some(threshold) = self.options.level {
            if !token.is_at_least(threshold) {
                callback();
                return Ok(());
            }
        }

        self.warn_collisions(&record);

        match record {
            LogRecord::Trace(trace) => self.forward_trace(trace, token.severity()),
            LogRecord::Request(request) => self.forward_request(request),
        }

        callback();
        Ok(())
    }
}
