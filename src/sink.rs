use crate::error::UnknownLevelError;
use crate::record::LogRecord;

/// Completion callback handed in by the logging pipeline.
pub type LogCallback<'a> = Box<dyn FnOnce() + 'a>;

/// Synchronous destination for [`LogRecord`]s produced by a logging
/// pipeline.
///
/// Implementations forward records to a telemetry backend without
/// blocking the calling thread on I/O.
pub trait LogSink: Send + Sync {
    /// Forward a single record.
    ///
    /// **Parameters**
    /// - `record`: the record to forward; consumed by the call.
    /// - `callback`: invoked exactly once, synchronously, after forwarding
    ///   has been initiated. It carries no error: delivery failures are
    ///   the telemetry client's concern.
    ///
    /// **Returns**
    /// - `Ok(())` once the record was handed to the client (or filtered).
    /// - `Err(UnknownLevelError)` if the record's level has no severity.
    ///   Nothing was forwarded and `callback` was not invoked.
    fn log(&self, record: LogRecord, callback: LogCallback<'_>) -> Result<(), UnknownLevelError>;

    /// [`LogSink::log`] without a completion callback.
    fn handle(&self, record: LogRecord) -> Result<(), UnknownLevelError> {
        self.log(record, Box::new(|| {}))
    }
}
