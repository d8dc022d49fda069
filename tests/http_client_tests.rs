#![cfg(feature = "http")]

use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

use tracing_appinsights::client::envelope::Envelope;
use tracing_appinsights::client::http::{
    HttpClientConfig, HttpProvider, HttpTelemetryClient, IngestionEndpoint, ReqwestEndpoint,
};
use tracing_appinsights::client::{ClientSetup, TelemetryClient, TraceTelemetry};
use tracing_appinsights::options::AppInsightsOptions;
use tracing_appinsights::reporter::ManualRuntime;
use tracing_appinsights::{
    AppInsightsTransport, ClientError, LogSink, Properties, RequestRecord, SeverityLevel,
};

const KEY: &str = "11111111-2222-3333-4444-555555555555";

/// Endpoint that keeps every batch as JSON, optionally failing each post.
#[derive(Default)]
struct RecordingEndpoint {
    batches: Mutex<Vec<Vec<serde_json::Value>>>,
    fail: bool,
}

impl RecordingEndpoint {
    fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    fn batches(&self) -> Vec<Vec<serde_json::Value>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestionEndpoint for RecordingEndpoint {
    async fn post(&self, batch: &[Envelope]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let json: Vec<serde_json::Value> =
            batch.iter().map(|e| serde_json::to_value(e).unwrap()).collect();
        self.batches.lock().unwrap().push(json);
        if self.fail {
            Err("ingestion unavailable".into())
        } else {
            Ok(())
        }
    }
}

fn setup() -> ClientSetup {
    ClientSetup::new(KEY)
        .set_auto_collect_console(false)
        .set_auto_collect_exceptions(false)
        .set_auto_collect_requests(false)
        .set_auto_dependency_correlation(false)
}

fn config(max_batch_size: usize) -> HttpClientConfig {
    HttpClientConfig {
        max_batch_size,
        max_batch_interval: Duration::from_secs(60),
        ..HttpClientConfig::default()
    }
}

fn trace(message: &str) -> TraceTelemetry {
    TraceTelemetry {
        message: message.to_string(),
        severity: SeverityLevel::Information,
        properties: Properties::new(),
    }
}

async fn wait_for_batches(endpoint: &RecordingEndpoint, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while endpoint.batches().len() < count {
        assert!(Instant::now() < deadline, "timed out waiting for {} batches", count);
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_full_batch_is_posted() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let (client, _handle) = HttpTelemetryClient::start(&setup(), config(2), endpoint.clone()).unwrap();

    client.track_trace(trace("one"));
    client.track_trace(trace("two"));
    wait_for_batches(&endpoint, 1).await;

    let batches = endpoint.batches();
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0][0]["data"]["baseData"]["message"], "one");
    assert_eq!(batches[0][1]["iKey"], KEY);
    assert_eq!(client.enqueued_items.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_partial_batch_is_posted_on_interval() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let setup = setup().set_max_batch_interval(Some(Duration::from_millis(50)));
    let (client, _handle) = HttpTelemetryClient::start(&setup, config(100), endpoint.clone()).unwrap();

    client.track_trace(trace("lonely"));
    wait_for_batches(&endpoint, 1).await;

    assert_eq!(endpoint.batches()[0].len(), 1);
}

#[tokio::test]
async fn test_flush_posts_queued_items() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let (client, _handle) = HttpTelemetryClient::start(&setup(), config(100), endpoint.clone()).unwrap();

    client.track_trace(trace("queued"));
    client.flush();
    wait_for_batches(&endpoint, 1).await;

    assert_eq!(endpoint.batches()[0][0]["data"]["baseType"], "MessageData");
}

#[tokio::test]
async fn test_dropping_client_flushes_and_stops() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let (client, handle) = HttpTelemetryClient::start(&setup(), config(100), endpoint.clone()).unwrap();

    client.track_trace(trace("last words"));
    drop(client);
    handle.await.unwrap();

    let batches = endpoint.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0]["data"]["baseData"]["message"], "last words");
}

#[tokio::test]
async fn test_failed_batch_is_counted_not_retried() {
    let endpoint = Arc::new(RecordingEndpoint::failing());
    let (client, handle) = HttpTelemetryClient::start(&setup(), config(100), endpoint.clone()).unwrap();
    let failed = Arc::clone(&client.failed_batches);

    client.track_trace(trace("lost"));
    drop(client);
    handle.await.unwrap();

    assert_eq!(endpoint.batches().len(), 1);
    assert_eq!(failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_transport_over_http_provider() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let provider = HttpProvider::with_endpoint(config(100), endpoint.clone());
    let options = AppInsightsOptions::new(KEY).custom_field("serviceName", "x");
    let transport =
        AppInsightsTransport::new(options, &provider, Arc::new(ManualRuntime::new())).unwrap();

    let record = RequestRecord::new("info", "GET /a", "/a")
        .duration("42")
        .result_code(200i64)
        .success(true);
    transport.handle(record.into()).unwrap();
    transport.client().flush();
    wait_for_batches(&endpoint, 1).await;

    let batches = endpoint.batches();
    let envelope = &batches[0][0];
    let base = &envelope["data"]["baseData"];
    assert_eq!(envelope["data"]["baseType"], "RequestData");
    assert_eq!(base["duration"], "00:00:00.042");
    assert_eq!(base["responseCode"], "200");
    assert_eq!(base["success"], true);
    assert_eq!(base["properties"]["serviceName"], "x");
}

#[tokio::test]
async fn test_auto_collection_is_refused() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let result = HttpTelemetryClient::start(&ClientSetup::new(KEY), config(1), endpoint);
    assert!(matches!(result, Err(ClientError::Unsupported(_))));
}

#[tokio::test]
async fn test_empty_key_is_refused() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let result = HttpTelemetryClient::start(&ClientSetup::new(""), config(1), endpoint);
    assert!(matches!(result, Err(ClientError::MissingInstrumentationKey)));
}

#[test]
fn test_start_outside_runtime_fails() {
    let endpoint = Arc::new(RecordingEndpoint::default());
    let result = HttpTelemetryClient::start(&setup(), config(1), endpoint);
    assert!(matches!(result, Err(ClientError::NoRuntime)));
}

#[test]
fn test_endpoint_url_gets_track_path() {
    let endpoint = ReqwestEndpoint::new("https://example.invalid/").unwrap();
    assert_eq!(endpoint.url(), "https://example.invalid/v2/track");
}
