use crate::client::envelope::{Envelope, EnvelopeFactory};
use crate::client::{
    ClientSetup, ExceptionTelemetry, RequestTelemetry, TelemetryClient, TelemetryProvider,
    TraceTelemetry,
};
use crate::error::ClientError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

/// Public ingestion host of Application Insights.
pub const DEFAULT_ENDPOINT_URL: &str = "https://dc.services.visualstudio.com";

/// Asynchronous destination for batches of [`Envelope`]s.
///
/// Called from the client's background task only, never on the
/// application thread.
#[async_trait]
pub trait IngestionEndpoint: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the service accepted the batch.
    /// - `Err(..)` on network, serialization or HTTP status failure. The
    ///   batch is dropped after the error is reported.
    async fn post(&self, batch: &[Envelope]) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// [`IngestionEndpoint`] posting JSON arrays to `<base>/v2/track`.
#[derive(Clone)]
pub struct ReqwestEndpoint {
    client: Client,
    url: String,
}

impl ReqwestEndpoint {
    pub fn new(endpoint_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: format!("{}/v2/track", endpoint_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IngestionEndpoint for ReqwestEndpoint {
    async fn post(&self, batch: &[Envelope]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let body = serde_json::to_vec(batch)?;
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("telemetry ingestion failed with status {}: {}", status, text).into())
        }
    }
}

/// Configuration of the [`HttpTelemetryClient`] background sender.
///
/// **Fields**
/// - `endpoint_url`: ingestion host, without the `/v2/track` path.
/// - `role_name`: reported as `ai.cloud.role` when set.
/// - `channel_buffer`: items queued before new ones are dropped.
/// - `max_batch_size`: items per POST.
/// - `max_batch_interval`: upper bound between sends of a partial batch,
///   unless the [`ClientSetup`] overrides it.
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    pub endpoint_url: String,
    pub role_name: Option<String>,
    pub channel_buffer: usize,
    pub max_batch_size: usize,
    pub max_batch_interval: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            role_name: None,
            channel_buffer: 1024,
            max_batch_size: 250,
            max_batch_interval: Duration::from_secs(15),
        }
    }
}

enum Command {
    Item(Envelope),
    Flush,
}

/// Telemetry client shipping envelopes over HTTP from a background task.
///
/// `track_*` serialize nothing and never wait: the envelope is queued on
/// a bounded channel and the task posts it with the next batch. Failed
/// posts are reported on stderr and not retried.
pub struct HttpTelemetryClient {
    sender: mpsc::Sender<Command>,
    factory: EnvelopeFactory,
    /// Items accepted into the channel.
    pub enqueued_items: Arc<AtomicU64>,
    /// Items dropped because the channel was full or closed.
    pub dropped_items: Arc<AtomicU64>,
    /// Batches the endpoint rejected.
    pub failed_batches: Arc<AtomicU64>,
}

impl HttpTelemetryClient {
    /// Validate `setup` and spawn the sender task on the current tokio
    /// runtime.
    ///
    /// **Returns**
    /// - the client and the task handle. The task ends after a final
    ///   flush once the client is dropped.
    /// - `Err(ClientError)` for an empty key, a setup that still asks for
    ///   automatic collection (this client collects nothing by itself),
    ///   or when called outside a tokio runtime.
    pub fn start(
        setup: &ClientSetup,
        config: HttpClientConfig,
        endpoint: Arc<dyn IngestionEndpoint>,
    ) -> Result<(Self, JoinHandle<()>), ClientError> {
        if setup.instrumentation_key.is_empty() {
            return Err(ClientError::MissingInstrumentationKey);
        }
        if setup.auto_collects() {
            return Err(ClientError::Unsupported("automatic collection"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        // Enforce minimal thresholds to avoid degenerate configs.
        let buffer = config.channel_buffer.max(16);
        let batch_size = config.max_batch_size.max(1);
        let interval = setup
            .max_batch_interval
            .unwrap_or(config.max_batch_interval)
            .max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Command>(buffer);
        let failed_batches = Arc::new(AtomicU64::new(0));
        let failed_bg = Arc::clone(&failed_batches);

        let handle = runtime.spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Item(envelope)) => {
                            batch.push(envelope);
                            if batch.len() >= batch_size {
                                send_batch(&*endpoint, &mut batch, &failed_bg).await;
                            }
                        }
                        Some(Command::Flush) => send_batch(&*endpoint, &mut batch, &failed_bg).await,
                        None => {
                            send_batch(&*endpoint, &mut batch, &failed_bg).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => send_batch(&*endpoint, &mut batch, &failed_bg).await,
                }
            }
        });

        let client = Self {
            sender: tx,
            factory: EnvelopeFactory::new(&setup.instrumentation_key, config.role_name.as_deref()),
            enqueued_items: Arc::new(AtomicU64::new(0)),
            dropped_items: Arc::new(AtomicU64::new(0)),
            failed_batches,
        };
        Ok((client, handle))
    }

    fn enqueue(&self, envelope: Envelope) {
        match self.sender.try_send(Command::Item(envelope)) {
            Ok(()) => {
                self.enqueued_items.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                self.dropped_items.fetch_add(1, Ordering::Relaxed);
                eprintln!("telemetry channel full, dropping item");
            }
        }
    }
}

async fn send_batch(endpoint: &dyn IngestionEndpoint, batch: &mut Vec<Envelope>, failed: &AtomicU64) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = endpoint.post(batch).await {
        failed.fetch_add(1, Ordering::Relaxed);
        eprintln!("error sending telemetry batch of {}: {}", batch.len(), e);
    }
    batch.clear();
}

impl TelemetryClient for HttpTelemetryClient {
    fn track_trace(&self, telemetry: TraceTelemetry) {
        self.enqueue(self.factory.trace(&telemetry, Utc::now()));
    }

    fn track_request(&self, telemetry: RequestTelemetry) {
        self.enqueue(self.factory.request(&telemetry, Utc::now()));
    }

    fn track_exception(&self, telemetry: ExceptionTelemetry) {
        self.enqueue(self.factory.exception(&telemetry, Utc::now()));
    }

    fn flush(&self) {
        let _ = self.sender.try_send(Command::Flush);
    }
}

/// [`TelemetryProvider`] starting [`HttpTelemetryClient`]s.
pub struct HttpProvider {
    config: HttpClientConfig,
    endpoint: Option<Arc<dyn IngestionEndpoint>>,
}

impl HttpProvider {
    pub fn new(config: HttpClientConfig) -> Self {
        Self { config, endpoint: None }
    }

    /// Post through `endpoint` instead of a [`ReqwestEndpoint`] built
    /// from the config.
    pub fn with_endpoint(config: HttpClientConfig, endpoint: Arc<dyn IngestionEndpoint>) -> Self {
        Self { config, endpoint: Some(endpoint) }
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new(HttpClientConfig::default())
    }
}

impl TelemetryProvider for HttpProvider {
    fn start(&self, setup: ClientSetup) -> Result<Arc<dyn TelemetryClient>, ClientError> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => Arc::clone(endpoint),
            None => Arc::new(ReqwestEndpoint::new(&self.config.endpoint_url)?),
        };
        let (client, _handle) = HttpTelemetryClient::start(&setup, self.config.clone(), endpoint)?;
        Ok(Arc::new(client))
    }
}
