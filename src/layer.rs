use crate::record::{LogRecord, Properties, PropertyValue};
use crate::severity::LevelToken;
use crate::sink::LogSink;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event field that replaces the level token derived from the event's
/// `tracing` level. The only way to emit `fatal` records.
pub const LEVEL_FIELD: &str = "level";

/// Targets skipped by default: the telemetry client and the HTTP stack
/// it posts through. Their events are emitted while a batch is sent and
/// would otherwise end up in the next batch.
pub const TRANSPORT_TARGETS: &[&str] = &["tracing_appinsights", "reqwest", "hyper", "h2", "rustls"];

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a [`LogSink`].
///
/// The event's fields become record properties and its `message` field
/// the record message. An event carrying a `url` field is forwarded as a
/// request. Level filtering is left to the sink; events from
/// [`TRANSPORT_TARGETS`] (or whatever [`AppInsightsLayer::ignored_targets`]
/// sets) are skipped.
pub struct AppInsightsLayer {
    sink: Arc<dyn LogSink>,
    ignored_targets: Vec<String>,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
    /// Skipped because of their target.
    pub ignored_events: Arc<AtomicU64>,
    /// Accepted by the sink.
    pub forwarded_events: Arc<AtomicU64>,
    /// Rejected by the sink because of an unknown level token.
    pub failed_events: Arc<AtomicU64>,
}

impl AppInsightsLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            ignored_targets: TRANSPORT_TARGETS.iter().map(|t| t.to_string()).collect(),
            total_events: Arc::new(AtomicU64::new(0)),
            ignored_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the skipped target prefixes. An empty list forwards
    /// everything.
    pub fn ignored_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.ignored_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// `target` is one of the prefixes or a module below one.
    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| {
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for AppInsightsLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.is_ignored(event.metadata().target()) {
            self.ignored_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut properties = Properties::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { properties: &mut properties, message: &mut message };
        event.record(&mut visitor);

        let level = match properties.remove(LEVEL_FIELD) {
            Some(token) => token.to_string(),
            None => LevelToken::from(event.metadata().level()).as_str().to_string(),
        };

        let record = LogRecord::from_properties(message.unwrap_or_default(), level, properties);

        // Can't propagate out of a layer; tracing would feed this back in.
        match self.sink.handle(record) {
            Ok(()) => {
                self.forwarded_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("dropping log record: {}", e);
            }
        }
    }
}

pub struct FieldVisitor<'a> {
    pub properties: &'a mut Properties,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: PropertyValue) {
        self.properties.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, PropertyValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, PropertyValue::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, PropertyValue::from(format!("{:?}", value)));
        }
    }
}
