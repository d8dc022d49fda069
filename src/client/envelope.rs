//! Envelopes of the ingestion `v2/track` API.

use crate::client::{ExceptionTelemetry, RequestTelemetry, TraceTelemetry};
use crate::record::Properties;
use crate::severity::SeverityLevel;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

const SCHEMA_VERSION: u8 = 2;

/// One telemetry item on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub name: String,
    pub time: String,
    #[serde(rename = "iKey")]
    pub i_key: String,
    pub tags: BTreeMap<String, String>,
    pub data: Data,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    pub base_type: &'static str,
    pub base_data: BaseData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BaseData {
    Message(MessageData),
    Request(RequestData),
    Exception(ExceptionData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub ver: u8,
    pub message: String,
    pub severity_level: SeverityLevel,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub ver: u8,
    pub id: String,
    pub name: String,
    pub duration: String,
    pub response_code: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub url: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionData {
    pub ver: u8,
    pub exceptions: Vec<ExceptionDetails>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub type_name: String,
    pub message: String,
    pub has_full_stack: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Builds envelopes for one instrumentation key.
#[derive(Debug, Clone)]
pub struct EnvelopeFactory {
    i_key: String,
    name_prefix: String,
    tags: BTreeMap<String, String>,
}

impl EnvelopeFactory {
    pub fn new(instrumentation_key: &str, role_name: Option<&str>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(
            "ai.internal.sdkVersion".to_string(),
            format!("rs:{}:{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        );
        if let Some(role) = role_name {
            tags.insert("ai.cloud.role".to_string(), role.to_string());
        }

        EnvelopeFactory {
            i_key: instrumentation_key.to_string(),
            name_prefix: format!(
                "Microsoft.ApplicationInsights.{}",
                instrumentation_key.replace('-', "")
            ),
            tags,
        }
    }

    fn envelope(&self, kind: &str, time: DateTime<Utc>, base_type: &'static str, base_data: BaseData) -> Envelope {
        Envelope {
            name: format!("{}.{}", self.name_prefix, kind),
            time: time.to_rfc3339_opts(SecondsFormat::Millis, true),
            i_key: self.i_key.clone(),
            tags: self.tags.clone(),
            data: Data { base_type, base_data },
        }
    }

    pub fn trace(&self, telemetry: &TraceTelemetry, time: DateTime<Utc>) -> Envelope {
        self.envelope(
            "Message",
            time,
            "MessageData",
            BaseData::Message(MessageData {
                ver: SCHEMA_VERSION,
                message: telemetry.message.clone(),
                severity_level: telemetry.severity,
                properties: stringify(&telemetry.properties),
            }),
        )
    }

    pub fn request(&self, telemetry: &RequestTelemetry, time: DateTime<Utc>) -> Envelope {
        self.envelope(
            "Request",
            time,
            "RequestData",
            BaseData::Request(RequestData {
                ver: SCHEMA_VERSION,
                id: uuid::Uuid::new_v4().to_string(),
                name: telemetry.name.clone(),
                duration: format_duration(telemetry.duration),
                response_code: telemetry.result_code.clone(),
                success: telemetry.success,
                source: telemetry.source.clone(),
                url: telemetry.url.clone(),
                properties: stringify(&telemetry.properties),
            }),
        )
    }

    pub fn exception(&self, telemetry: &ExceptionTelemetry, time: DateTime<Utc>) -> Envelope {
        let error = &telemetry.exception;
        self.envelope(
            "Exception",
            time,
            "ExceptionData",
            BaseData::Exception(ExceptionData {
                ver: SCHEMA_VERSION,
                exceptions: vec![ExceptionDetails {
                    type_name: error.type_name.clone(),
                    message: error.message.clone(),
                    has_full_stack: error.stack.is_some(),
                    stack: error.stack.clone(),
                }],
                properties: stringify(&telemetry.properties),
            }),
        )
    }
}

fn stringify(properties: &Properties) -> BTreeMap<String, String> {
    properties.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
}

/// Render milliseconds as `[d.]hh:mm:ss.fff`. Unknown or negative
/// durations render as zero.
pub fn format_duration(millis: Option<i64>) -> String {
    let total = millis.filter(|ms| *ms >= 0).unwrap_or(0);
    let ms = total % 1000;
    let secs = (total / 1000) % 60;
    let mins = (total / 60_000) % 60;
    let hours = (total / 3_600_000) % 24;
    let days = total / 86_400_000;

    let clock = format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms);
    if days > 0 {
        format!("{}.{}", days, clock)
    } else {
        clock
    }
}
