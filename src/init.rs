use crate::client::TelemetryProvider;
use crate::error::{ClientError, InitError};
use crate::layer::AppInsightsLayer;
use crate::options::AppInsightsOptions;
use crate::reporter::ErrorRuntime;
use crate::sink::LogSink;
use crate::transport::AppInsightsTransport;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Subscriber-level configuration.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`AppInsightsLayer`] and events are also printed to
///   the console.
#[derive(Clone, Debug)]
pub struct InitConfig {
    pub enable_stdout: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self { enable_stdout: true }
    }
}

/// Build the transport and a layer feeding it, for callers composing
/// their own subscriber.
pub fn appinsights_layer(
    options: AppInsightsOptions,
    provider: &dyn TelemetryProvider,
    runtime: Arc<dyn ErrorRuntime>,
) -> Result<(AppInsightsLayer, Arc<AppInsightsTransport>), ClientError> {
    let transport = Arc::new(AppInsightsTransport::new(options, provider, runtime)?);
    let layer = AppInsightsLayer::new(Arc::clone(&transport) as Arc<dyn LogSink>);
    Ok((layer, transport))
}

/// Install a global `tracing` subscriber forwarding to Application
/// Insights.
///
/// **Parameters**
/// - `options`: transport options, see [`AppInsightsOptions`].
/// - `provider`: started once to obtain the telemetry client.
/// - `runtime`: where process-level errors are reported from.
/// - `config`: [`InitConfig`].
///
/// **Returns**
/// - the transport, to `dispose` it or reach its client (e.g. to flush
///   before exit).
/// - `Err(InitError)` if the client could not start or a global
///   subscriber is already set.
pub fn init_tracing_with_config(
    options: AppInsightsOptions,
    provider: &dyn TelemetryProvider,
    runtime: Arc<dyn ErrorRuntime>,
    config: InitConfig,
) -> Result<Arc<AppInsightsTransport>, InitError> {
    let (layer, transport) = appinsights_layer(options, provider, runtime)?;

    // Two subscriber shapes, so the types differ per branch.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(transport)
}

/// Initialize tracing with the HTTP client and panic reporting.
///
/// Equivalent to [`init_tracing_with_config`] with an
/// [`crate::client::http::HttpProvider`] configured from the
/// environment, [`crate::reporter::PanicRuntime`] and
/// [`InitConfig::default`]. Must be called inside a tokio runtime.
#[cfg(feature = "http")]
pub fn init_tracing(options: AppInsightsOptions) -> Result<Arc<AppInsightsTransport>, InitError> {
    use crate::client::http::{HttpClientConfig, HttpProvider};
    use crate::reporter::PanicRuntime;

    let provider = HttpProvider::new(HttpClientConfig::from_env());
    init_tracing_with_config(options, &provider, Arc::new(PanicRuntime::new()), InitConfig::default())
}
