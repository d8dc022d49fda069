use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar attached to a record as metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

/// Ordered metadata bag attached to records and telemetry items.
pub type Properties = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// JavaScript-style truthiness: empty strings and zero are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            PropertyValue::Bool(b) => *b,
            PropertyValue::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
            PropertyValue::String(s) => !s.is_empty(),
        }
    }

    /// Base-10 integer coercion.
    ///
    /// Leading whitespace and one sign are accepted, then as many digits
    /// as follow; trailing garbage is ignored. `None` when no digit could
    /// be read (the "not a number" case) or the value does not fit.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Bool(_) => None,
            PropertyValue::Number(n) => parse_int(&n.to_string()),
            PropertyValue::String(s) => parse_int(s),
        }
    }
}

fn parse_int(input: &str) -> Option<i64> {
    let s = input.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits.bytes().take_while(|b| b.is_ascii_digit()).count();
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<f64> for PropertyValue {
    /// Non-finite floats have no JSON number form and become strings.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(PropertyValue::Number)
            .unwrap_or_else(|| PropertyValue::String(value.to_string()))
    }
}

/// Keys lifted out of a property bag when it describes a request.
pub const URL_KEY: &str = "url";
pub const NAME_KEY: &str = "name";
pub const DURATION_KEY: &str = "duration";
pub const RESULT_CODE_KEY: &str = "resultCode";
/// Accepted in place of [`RESULT_CODE_KEY`], which wins when both are set.
pub const RESULT_CODE_ALIAS: &str = "result_code";
pub const SUCCESS_KEY: &str = "success";
pub const SOURCE_KEY: &str = "source";

/// A generic log line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub level: String,
    pub message: String,
    pub properties: Properties,
}

impl TraceRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        TraceRecord { level: level.into(), message: message.into(), properties: Properties::new() }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An HTTP request event.
///
/// `duration`, `result_code` and `success` are kept as produced; the
/// transport coerces them when forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub level: String,
    pub name: String,
    pub url: String,
    pub duration: Option<PropertyValue>,
    pub result_code: Option<PropertyValue>,
    pub success: Option<PropertyValue>,
    pub source: Option<String>,
    pub properties: Properties,
    field_keys: Vec<&'static str>,
}

impl RequestRecord {
    pub fn new(level: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        RequestRecord {
            level: level.into(),
            name: name.into(),
            url: url.into(),
            duration: None,
            result_code: None,
            success: None,
            source: None,
            properties: Properties::new(),
            field_keys: vec![URL_KEY, NAME_KEY],
        }
    }

    pub fn duration(mut self, value: impl Into<PropertyValue>) -> Self {
        self.duration = Some(value.into());
        self.add_field_key(DURATION_KEY);
        self
    }

    pub fn result_code(mut self, value: impl Into<PropertyValue>) -> Self {
        self.result_code = Some(value.into());
        self.add_field_key(RESULT_CODE_KEY);
        self
    }

    pub fn success(mut self, value: impl Into<PropertyValue>) -> Self {
        self.success = Some(value.into());
        self.add_field_key(SUCCESS_KEY);
        self
    }

    pub fn source(mut self, value: impl Into<String>) -> Self {
        self.source = Some(value.into());
        self.add_field_key(SOURCE_KEY);
        self
    }

    /// Keys the caller supplied as request fields rather than properties.
    /// Together with the property keys they are what the caller sent.
    pub fn field_keys(&self) -> &[&'static str] {
        &self.field_keys
    }

    fn add_field_key(&mut self, key: &'static str) {
        if !self.field_keys.contains(&key) {
            self.field_keys.push(key);
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A record handed to a [`crate::sink::LogSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Trace(TraceRecord),
    Request(RequestRecord),
}

impl LogRecord {
    /// Build a record from a flat property bag.
    ///
    /// A bag containing [`URL_KEY`] describes a request: the request keys
    /// are lifted out and the rest stays as properties. A missing `name`
    /// falls back to `message`. Any other bag is a trace.
    ///
    /// The lifted keys are remembered, see [`RequestRecord::field_keys`].
    pub fn from_properties(
        message: impl Into<String>,
        level: impl Into<String>,
        mut properties: Properties,
    ) -> Self {
        let level = level.into();
        let message = message.into();

        let url = match properties.remove(URL_KEY) {
            Some(url) => url.to_string(),
            None => return LogRecord::Trace(TraceRecord { level, message, properties }),
        };

        let mut field_keys = vec![URL_KEY];
        let mut lift = |key: &'static str| {
            let value = properties.remove(key);
            if value.is_some() {
                field_keys.push(key);
            }
            value
        };

        let name = lift(NAME_KEY).map(|v| v.to_string()).unwrap_or(message);
        let duration = lift(DURATION_KEY);
        let result_code = lift(RESULT_CODE_KEY);
        let result_code_alias = lift(RESULT_CODE_ALIAS);
        let result_code = result_code.or(result_code_alias);
        let success = lift(SUCCESS_KEY);
        let source = lift(SOURCE_KEY).map(|v| v.to_string());

        LogRecord::Request(RequestRecord {
            level,
            name,
            url,
            duration,
            result_code,
            success,
            source,
            properties,
            field_keys,
        })
    }

    pub fn level(&self) -> &str {
        match self {
            LogRecord::Trace(trace) => &trace.level,
            LogRecord::Request(request) => &request.level,
        }
    }

    /// Every key the producer supplied, sorted: the properties plus, for
    /// requests, the keys of the request fields.
    pub fn supplied_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.properties().keys().map(String::as_str).collect();
        if let LogRecord::Request(request) = self {
            keys.extend(request.field_keys.iter().copied());
        }
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn properties(&self) -> &Properties {
        match self {
            LogRecord::Trace(trace) => &trace.properties,
            LogRecord::Request(request) => &request.properties,
        }
    }
}

impl From<TraceRecord> for LogRecord {
    fn from(record: TraceRecord) -> Self {
        LogRecord::Trace(record)
    }
}

impl From<RequestRecord> for LogRecord {
    fn from(record: RequestRecord) -> Self {
        LogRecord::Request(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: &[(&str, PropertyValue)]) -> Properties {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_bag_without_url_is_trace() {
        let record = LogRecord::from_properties(
            "hello",
            "info",
            bag(&[("name", "not-a-request".into()), ("duration", "3".into())]),
        );
        match record {
            LogRecord::Trace(trace) => {
                assert_eq!(trace.message, "hello");
                assert_eq!(trace.properties.len(), 2);
            }
            other => panic!("expected trace, got {:?}", other),
        }
    }

    #[test]
    fn test_bag_with_url_is_request() {
        let record = LogRecord::from_properties(
            "GET /a",
            "info",
            bag(&[
                ("url", "/a".into()),
                ("name", "req".into()),
                ("duration", "42".into()),
                ("resultCode", 200i64.into()),
                ("success", true.into()),
                ("source", "gateway".into()),
                ("tenant", "acme".into()),
            ]),
        );
        let LogRecord::Request(request) = record else {
            panic!("expected request");
        };
        assert_eq!(request.name, "req");
        assert_eq!(request.url, "/a");
        assert_eq!(request.duration, Some("42".into()));
        assert_eq!(request.result_code, Some(200i64.into()));
        assert_eq!(request.success, Some(true.into()));
        assert_eq!(request.source.as_deref(), Some("gateway"));
        assert_eq!(request.properties, bag(&[("tenant", "acme".into())]));
    }

    #[test]
    fn test_result_code_alias_never_stays_a_property() {
        let record = LogRecord::from_properties(
            "GET /a",
            "info",
            bag(&[
                ("url", "/a".into()),
                ("resultCode", 200i64.into()),
                ("result_code", 500i64.into()),
            ]),
        );
        let LogRecord::Request(request) = &record else {
            panic!("expected request");
        };
        assert_eq!(request.result_code, Some(200i64.into()));
        assert!(request.properties.is_empty());
        assert_eq!(record.supplied_keys(), vec!["resultCode", "result_code", "url"]);

        let record = LogRecord::from_properties(
            "GET /a",
            "info",
            bag(&[("url", "/a".into()), ("result_code", 404i64.into())]),
        );
        let LogRecord::Request(request) = record else {
            panic!("expected request");
        };
        assert_eq!(request.result_code, Some(404i64.into()));
        assert!(request.properties.is_empty());
    }

    #[test]
    fn test_supplied_keys_cover_request_fields() {
        let record: LogRecord = RequestRecord::new("info", "req", "/a")
            .success(true)
            .with_property("tenant", "acme")
            .into();
        assert_eq!(record.supplied_keys(), vec!["name", "success", "tenant", "url"]);

        let record: LogRecord = TraceRecord::new("info", "m").with_property("url2", "x").into();
        assert_eq!(record.supplied_keys(), vec!["url2"]);
    }

    #[test]
    fn test_request_name_falls_back_to_message() {
        let record = LogRecord::from_properties("GET /b", "info", bag(&[("url", "/b".into())]));
        let LogRecord::Request(request) = record else {
            panic!("expected request");
        };
        assert_eq!(request.name, "GET /b");
        assert_eq!(request.duration, None);
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(PropertyValue::from("42").to_integer(), Some(42));
        assert_eq!(PropertyValue::from("  -7ms").to_integer(), Some(-7));
        assert_eq!(PropertyValue::from("+15.9").to_integer(), Some(15));
        assert_eq!(PropertyValue::from(42.9).to_integer(), Some(42));
        assert_eq!(PropertyValue::from(12i64).to_integer(), Some(12));
        assert_eq!(PropertyValue::from("abc").to_integer(), None);
        assert_eq!(PropertyValue::from("").to_integer(), None);
        assert_eq!(PropertyValue::from("-").to_integer(), None);
        assert_eq!(PropertyValue::from(true).to_integer(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(PropertyValue::from(true).is_truthy());
        assert!(!PropertyValue::from(false).is_truthy());
        assert!(PropertyValue::from("false").is_truthy());
        assert!(!PropertyValue::from("").is_truthy());
        assert!(PropertyValue::from(1i64).is_truthy());
        assert!(!PropertyValue::from(0i64).is_truthy());
        assert!(!PropertyValue::from(0.0).is_truthy());
    }

    #[test]
    fn test_display_matches_wire_strings() {
        assert_eq!(PropertyValue::from(200i64).to_string(), "200");
        assert_eq!(PropertyValue::from(false).to_string(), "false");
        assert_eq!(PropertyValue::from("x").to_string(), "x");
    }
}
