use tokio::time::{sleep, Duration};
use tracing::{error, info};

use tracing_appinsights::init::init_tracing;
use tracing_appinsights::options::AppInsightsOptions;
use tracing_appinsights::reporter::PanicRuntime;

#[derive(Debug)]
struct UpstreamTimeout;

impl std::fmt::Display for UpstreamTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("upstream timed out")
    }
}

impl std::error::Error for UpstreamTimeout {}

#[tokio::main]
async fn main() {
    let options = AppInsightsOptions::from_env()
        .expect("read options")
        .custom_field("serviceName", "gateway")
        .max_batch_interval(Duration::from_millis(500));
    let transport = init_tracing(options).expect("init tracing");

    info!("gateway up");

    info!(
        url = "/orders/17",
        name = "GET /orders/{id}",
        duration = "38",
        resultCode = 200,
        success = true,
        "request served"
    );

    error!(url = "/orders", name = "POST /orders", duration = 112, resultCode = 502, success = false, "request failed");

    // Reported as an unhandled rejection; the task itself fails.
    let failed = PanicRuntime::spawn_reported(async { Err::<(), _>(UpstreamTimeout) });
    let _ = failed.await;

    transport.client().flush();
    sleep(Duration::from_secs(1)).await;
}
