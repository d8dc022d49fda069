pub mod error;
pub mod severity;
pub mod record;
pub mod sink;
pub mod options;
pub mod client;
pub mod reporter;
pub mod transport;
pub mod layer;

pub mod env;
pub mod init;

pub use error::{ClientError, InitError, UnknownLevelError};
pub use record::{LogRecord, Properties, PropertyValue, RequestRecord, TraceRecord};
pub use severity::{translate_severity, LevelToken, SeverityLevel};
pub use sink::LogSink;
pub use transport::AppInsightsTransport;
