use crate::client::{
    ClientSetup, ExceptionTelemetry, RequestTelemetry, TelemetryClient, TelemetryProvider,
    TraceTelemetry,
};
use crate::error::ClientError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One call received by a [`MemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Tracked {
    Trace(TraceTelemetry),
    Request(RequestTelemetry),
    Exception(ExceptionTelemetry),
}

/// A client that keeps every tracked item in memory.
///
/// Useful for wiring the transport without any external I/O, and for
/// tests that assert on exactly what would have been sent.
#[derive(Debug, Default)]
pub struct MemoryClient {
    items: Mutex<Vec<Tracked>>,
    flushes: AtomicU64,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything tracked so far, in call order.
    pub fn items(&self) -> Vec<Tracked> {
        lock(&self.items).clone()
    }

    pub fn traces(&self) -> Vec<TraceTelemetry> {
        lock(&self.items)
            .iter()
            .filter_map(|item| match item {
                Tracked::Trace(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn requests(&self) -> Vec<RequestTelemetry> {
        lock(&self.items)
            .iter()
            .filter_map(|item| match item {
                Tracked::Request(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn exceptions(&self) -> Vec<ExceptionTelemetry> {
        lock(&self.items)
            .iter()
            .filter_map(|item| match item {
                Tracked::Exception(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `flush` calls received.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }
}

impl TelemetryClient for MemoryClient {
    fn track_trace(&self, telemetry: TraceTelemetry) {
        lock(&self.items).push(Tracked::Trace(telemetry));
    }

    fn track_request(&self, telemetry: RequestTelemetry) {
        lock(&self.items).push(Tracked::Request(telemetry));
    }

    fn track_exception(&self, telemetry: ExceptionTelemetry) {
        lock(&self.items).push(Tracked::Exception(telemetry));
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Provider handing out one shared [`MemoryClient`] and remembering
/// every setup it was started with.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    client: Arc<MemoryClient>,
    setups: Mutex<Vec<ClientSetup>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Arc<MemoryClient> {
        Arc::clone(&self.client)
    }

    pub fn setups(&self) -> Vec<ClientSetup> {
        lock(&self.setups).clone()
    }
}

impl TelemetryProvider for MemoryProvider {
    fn start(&self, setup: ClientSetup) -> Result<Arc<dyn TelemetryClient>, ClientError> {
        if setup.instrumentation_key.is_empty() {
            return Err(ClientError::MissingInstrumentationKey);
        }
        lock(&self.setups).push(setup);
        Ok(Arc::clone(&self.client) as Arc<dyn TelemetryClient>)
    }
}

// Items must stay readable after a panicking test thread held the lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
