//! Reporting of errors that escape to the process level.
//!
//! Handlers are registered against an [`ErrorRuntime`] instead of
//! process globals, and every registration can be taken back. The
//! runtime decides what "default behavior" means once handlers ran:
//! [`PanicRuntime`] keeps the panic going, [`ManualRuntime`] records the
//! error as escalated.

use crate::client::{ExceptionTelemetry, TelemetryClient};
use crate::record::Properties;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock, RwLock};

/// Process-level notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorChannel {
    /// A panic on any thread.
    UncaughtError,
    /// Background work that failed with nobody awaiting its result.
    UnhandledRejection,
}

/// Error as reported to the telemetry service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessError {
    pub type_name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ProcessError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ProcessError { type_name: type_name.into(), message: message.into(), stack: None }
    }

    /// Capture an error value. The `source()` chain becomes the stack text.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("Caused by: {}", cause));
            source = cause.source();
        }

        ProcessError {
            type_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            stack: if causes.is_empty() { None } else { Some(causes.join("\n")) },
        }
    }

    /// Capture a panic from its payload and location.
    pub fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        let mut stack = Vec::new();
        if let Some(location) = location {
            stack.push(format!("at {}", location));
        }
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            stack.push(backtrace.to_string());
        }

        ProcessError {
            type_name: "panic".to_string(),
            message,
            stack: if stack.is_empty() { None } else { Some(stack.join("\n")) },
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

pub type ErrorHandler = Arc<dyn Fn(&ProcessError) + Send + Sync>;

/// Handle returned by [`ErrorRuntime::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Source of process-level error notifications.
pub trait ErrorRuntime: Send + Sync {
    /// Register `handler` for `channel`. Handlers only observe: after
    /// they ran, the runtime carries on with its default behavior.
    fn subscribe(&self, channel: ErrorChannel, handler: ErrorHandler) -> SubscriptionId;

    /// Remove a registration. Returns `false` if it was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, ErrorChannel, ErrorHandler)>>,
}

impl HandlerRegistry {
    fn subscribe(&self, channel: ErrorChannel, handler: ErrorHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, channel, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(sid, _, _)| *sid != id);
        handlers.len() != before
    }

    fn count(&self, channel: ErrorChannel) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, c, _)| *c == channel)
            .count()
    }

    /// Handlers run outside the lock so they may (un)subscribe.
    fn dispatch(&self, channel: ErrorChannel, error: &ProcessError) {
        let selected: Vec<ErrorHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, c, _)| *c == channel)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in selected {
            handler(error);
        }
    }
}

/// Runtime driven explicitly through [`ManualRuntime::raise`].
///
/// Used to host the transport in environments that surface failures
/// their own way, and in tests.
#[derive(Default)]
pub struct ManualRuntime {
    registry: HandlerRegistry,
    escalated: Mutex<Vec<(ErrorChannel, ProcessError)>>,
}

impl ManualRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify the handlers of `channel`, then hand `error` on to the
    /// default handler (recorded, see [`ManualRuntime::escalated`]).
    pub fn raise(&self, channel: ErrorChannel, error: ProcessError) {
        self.registry.dispatch(channel, &error);
        self.escalated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel, error));
    }

    /// Errors that reached the default handler, in order.
    pub fn escalated(&self) -> Vec<(ErrorChannel, ProcessError)> {
        self.escalated.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn handler_count(&self, channel: ErrorChannel) -> usize {
        self.registry.count(channel)
    }
}

impl ErrorRuntime for ManualRuntime {
    fn subscribe(&self, channel: ErrorChannel, handler: ErrorHandler) -> SubscriptionId {
        self.registry.subscribe(channel, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

static PANIC_REGISTRY: OnceLock<HandlerRegistry> = OnceLock::new();
static PANIC_HOOK: Once = Once::new();

/// Panic payload of a re-raised rejection, see [`PanicRuntime::reject`].
///
/// Recoverable from a `JoinError` or `catch_unwind` result by
/// downcasting the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(pub ProcessError);

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled rejection: {}", self.0)
    }
}

fn panic_registry() -> &'static HandlerRegistry {
    PANIC_REGISTRY.get_or_init(HandlerRegistry::default)
}

/// Replace the current panic hook with one that dispatches to the
/// subscribed handlers and then calls the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // Rejections were reported on their own channel already.
            if info.payload().downcast_ref::<Rejection>().is_none() {
                let error = ProcessError::from_panic(info.payload(), info.location());
                panic_registry().dispatch(ErrorChannel::UncaughtError, &error);
            }
            previous(info);
        }));
    });
}

/// The process runtime: panics are uncaught errors, failed background
/// tasks are unhandled rejections.
///
/// The panic hook is installed the first time anything subscribes and
/// stays for the rest of the process; handlers come and go through
/// [`ErrorRuntime::unsubscribe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicRuntime;

impl PanicRuntime {
    pub fn new() -> Self {
        PanicRuntime
    }

    /// Report `error` as an unhandled rejection and re-raise it as a
    /// panic on the current thread, with a [`Rejection`] payload.
    pub fn reject(error: ProcessError) -> ! {
        panic_registry().dispatch(ErrorChannel::UnhandledRejection, &error);
        std::panic::panic_any(Rejection(error))
    }

    /// Spawn `future` on the current tokio runtime; an `Err` output is
    /// rejected through [`PanicRuntime::reject`], failing the task.
    pub fn spawn_reported<F, T, E>(future: F) -> tokio::task::JoinHandle<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + 'static,
    {
        tokio::spawn(async move {
            match future.await {
                Ok(value) => value,
                Err(err) => PanicRuntime::reject(ProcessError::from_error(&err)),
            }
        })
    }

    pub fn handler_count(&self, channel: ErrorChannel) -> usize {
        panic_registry().count(channel)
    }
}

impl ErrorRuntime for PanicRuntime {
    fn subscribe(&self, channel: ErrorChannel, handler: ErrorHandler) -> SubscriptionId {
        install_panic_hook();
        panic_registry().subscribe(channel, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        panic_registry().unsubscribe(id)
    }
}

/// Exception reporting owned by one transport instance.
pub struct ErrorReporter {
    runtime: Arc<dyn ErrorRuntime>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl ErrorReporter {
    /// Subscribe to each of `channels`, reporting every error as an
    /// exception tagged with `custom_fields`.
    ///
    /// The client is flushed after each report: the process is usually
    /// about to go down.
    pub fn register(
        runtime: Arc<dyn ErrorRuntime>,
        client: Arc<dyn TelemetryClient>,
        custom_fields: Properties,
        channels: &[ErrorChannel],
    ) -> Self {
        let handler: ErrorHandler = Arc::new(move |error: &ProcessError| {
            client.track_exception(ExceptionTelemetry {
                exception: error.clone(),
                properties: custom_fields.clone(),
            });
            client.flush();
        });

        let subscriptions = channels
            .iter()
            .map(|channel| runtime.subscribe(*channel, Arc::clone(&handler)))
            .collect();

        ErrorReporter { runtime, subscriptions: Mutex::new(subscriptions) }
    }

    /// Remove every subscription. Safe to call more than once.
    pub fn dispose(&self) {
        let subscriptions = std::mem::take(
            &mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for id in subscriptions {
            self.runtime.unsubscribe(id);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

impl Drop for ErrorReporter {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryClient;
    use crate::record::PropertyValue;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[derive(Debug, thiserror::Error)]
    #[error("sync failed")]
    struct SyncFailed(#[source] Reset);

    fn fields() -> Properties {
        let mut fields = Properties::new();
        fields.insert("serviceName".to_string(), PropertyValue::from("billing"));
        fields
    }

    #[test]
    fn test_from_error_folds_source_chain() {
        let error = ProcessError::from_error(&SyncFailed(Reset));
        assert!(error.type_name.ends_with("SyncFailed"));
        assert_eq!(error.message, "sync failed");
        assert_eq!(error.stack.as_deref(), Some("Caused by: connection reset"));
        assert_eq!(ProcessError::from_error(&Reset).stack, None);
    }

    #[test]
    fn test_from_panic_reads_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(ProcessError::from_panic(payload.as_ref(), None).message, "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(ProcessError::from_panic(payload.as_ref(), None).message, "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(
            ProcessError::from_panic(payload.as_ref(), None).message,
            "unknown panic payload"
        );
    }

    #[test]
    fn test_reporter_tracks_and_escalates() {
        let runtime = Arc::new(ManualRuntime::new());
        let client = Arc::new(MemoryClient::new());
        let _reporter = ErrorReporter::register(
            runtime.clone(),
            client.clone(),
            fields(),
            &[ErrorChannel::UnhandledRejection],
        );

        runtime.raise(ErrorChannel::UnhandledRejection, ProcessError::new("Timeout", "took too long"));

        let exceptions = client.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].exception.message, "took too long");
        assert_eq!(exceptions[0].properties, fields());
        assert_eq!(runtime.escalated().len(), 1);
    }

    #[test]
    fn test_report_flushes_client() {
        let runtime = Arc::new(ManualRuntime::new());
        let client = Arc::new(MemoryClient::new());
        let _reporter = ErrorReporter::register(
            runtime.clone(),
            client.clone(),
            fields(),
            &[ErrorChannel::UncaughtError],
        );
        assert_eq!(client.flush_count(), 0);

        runtime.raise(ErrorChannel::UncaughtError, ProcessError::new("panic", "boom"));

        assert_eq!(client.flush_count(), 1);
    }

    #[test]
    fn test_unsubscribed_channel_is_not_reported() {
        let runtime = Arc::new(ManualRuntime::new());
        let client = Arc::new(MemoryClient::new());
        let _reporter = ErrorReporter::register(
            runtime.clone(),
            client.clone(),
            fields(),
            &[ErrorChannel::UnhandledRejection],
        );

        runtime.raise(ErrorChannel::UncaughtError, ProcessError::new("panic", "boom"));

        assert!(client.exceptions().is_empty());
        assert_eq!(runtime.escalated().len(), 1);
    }

    #[test]
    fn test_dispose_removes_handlers() {
        let runtime = Arc::new(ManualRuntime::new());
        let client = Arc::new(MemoryClient::new());
        let reporter = ErrorReporter::register(
            runtime.clone(),
            client.clone(),
            fields(),
            &[ErrorChannel::UncaughtError, ErrorChannel::UnhandledRejection],
        );
        assert!(reporter.is_active());
        assert_eq!(runtime.handler_count(ErrorChannel::UncaughtError), 1);

        reporter.dispose();
        reporter.dispose();

        assert!(!reporter.is_active());
        assert_eq!(runtime.handler_count(ErrorChannel::UncaughtError), 0);
        assert_eq!(runtime.handler_count(ErrorChannel::UnhandledRejection), 0);
    }

    #[test]
    fn test_drop_disposes() {
        let runtime = Arc::new(ManualRuntime::new());
        let client = Arc::new(MemoryClient::new());
        {
            let _reporter = ErrorReporter::register(
                runtime.clone(),
                client.clone(),
                fields(),
                &[ErrorChannel::UncaughtError],
            );
            assert_eq!(runtime.handler_count(ErrorChannel::UncaughtError), 1);
        }
        assert_eq!(runtime.handler_count(ErrorChannel::UncaughtError), 0);
    }
}
