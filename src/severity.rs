use crate::error::UnknownLevelError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Level vocabulary of the logging side.
///
/// Variants are declared from most to least severe, so the derived
/// ordering reads `Fatal < Error < ... < Debug`: a level "passes" a
/// threshold when it compares less than or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LevelToken {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl LevelToken {
    pub const ALL: [LevelToken; 5] = [
        LevelToken::Fatal,
        LevelToken::Error,
        LevelToken::Warn,
        LevelToken::Info,
        LevelToken::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelToken::Fatal => "fatal",
            LevelToken::Error => "error",
            LevelToken::Warn => "warn",
            LevelToken::Info => "info",
            LevelToken::Debug => "debug",
        }
    }

    pub fn severity(&self) -> SeverityLevel {
        match self {
            LevelToken::Debug => SeverityLevel::Verbose,
            LevelToken::Info => SeverityLevel::Information,
            LevelToken::Warn => SeverityLevel::Warning,
            LevelToken::Error => SeverityLevel::Error,
            LevelToken::Fatal => SeverityLevel::Critical,
        }
    }

    /// Whether a record at `self` passes a `threshold` level.
    pub fn is_at_least(&self, threshold: LevelToken) -> bool {
        *self <= threshold
    }
}

impl fmt::Display for LevelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LevelToken {
    type Err = UnknownLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fatal" => Ok(LevelToken::Fatal),
            "error" => Ok(LevelToken::Error),
            "warn" => Ok(LevelToken::Warn),
            "info" => Ok(LevelToken::Info),
            "debug" => Ok(LevelToken::Debug),
            other => Err(UnknownLevelError::new(other)),
        }
    }
}

// tracing has no fatal level and one more verbose than debug.
impl From<&tracing::Level> for LevelToken {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LevelToken::Error,
            tracing::Level::WARN => LevelToken::Warn,
            tracing::Level::INFO => LevelToken::Info,
            _ => LevelToken::Debug,
        }
    }
}

/// Severity vocabulary of the telemetry service.
///
/// Serialized as the integer the ingestion API expects in
/// `severityLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeverityLevel {
    Verbose = 0,
    Information = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl Serialize for SeverityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Translate a logging level token into the telemetry severity.
///
/// **Returns**
/// - the matching [`SeverityLevel`] for `fatal`, `error`, `warn`, `info`
///   and `debug`.
/// - `Err(UnknownLevelError)` for anything else. There is no fallback
///   severity.
pub fn translate_severity(level: &str) -> Result<SeverityLevel, UnknownLevelError> {
    level.parse::<LevelToken>().map(|token| token.severity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_maps_to_verbose() {
        assert_eq!(translate_severity("debug"), Ok(SeverityLevel::Verbose));
    }

    #[test]
    fn test_info_maps_to_information() {
        assert_eq!(translate_severity("info"), Ok(SeverityLevel::Information));
    }

    #[test]
    fn test_warn_maps_to_warning() {
        assert_eq!(translate_severity("warn"), Ok(SeverityLevel::Warning));
    }

    #[test]
    fn test_error_maps_to_error() {
        assert_eq!(translate_severity("error"), Ok(SeverityLevel::Error));
    }

    #[test]
    fn test_fatal_maps_to_critical() {
        assert_eq!(translate_severity("fatal"), Ok(SeverityLevel::Critical));
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        for level in ["unknown", "", "WARN", "warning", "trace", " info"] {
            let err = translate_severity(level).unwrap_err();
            assert_eq!(err.level, level);
        }
        assert_eq!(
            translate_severity("verbose").unwrap_err().to_string(),
            "No severity level found for 'verbose'"
        );
    }

    #[test]
    fn test_tokens_round_trip_through_str() {
        for token in LevelToken::ALL {
            assert_eq!(token.as_str().parse::<LevelToken>(), Ok(token));
        }
    }

    #[test]
    fn test_ordering_is_by_severity() {
        assert!(LevelToken::Fatal < LevelToken::Error);
        assert!(LevelToken::Error.is_at_least(LevelToken::Warn));
        assert!(LevelToken::Warn.is_at_least(LevelToken::Warn));
        assert!(!LevelToken::Debug.is_at_least(LevelToken::Info));
    }

    #[test]
    fn test_tracing_levels() {
        assert_eq!(LevelToken::from(&tracing::Level::ERROR), LevelToken::Error);
        assert_eq!(LevelToken::from(&tracing::Level::TRACE), LevelToken::Debug);
    }

    #[test]
    fn test_severity_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&SeverityLevel::Critical).unwrap(), "4");
    }
}
