use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_appinsights::client::memory::{MemoryProvider, Tracked};
use tracing_appinsights::init::{init_tracing_with_config, InitConfig};
use tracing_appinsights::options::AppInsightsOptions;
use tracing_appinsights::reporter::ManualRuntime;

/// Wires the transport to an in-memory client and prints what would
/// have been sent.
fn main() {
    let provider = MemoryProvider::new();
    let options = AppInsightsOptions::new("00000000-0000-0000-0000-000000000000")
        .custom_field("serviceName", "auth");

    let _transport = init_tracing_with_config(
        options,
        &provider,
        Arc::new(ManualRuntime::new()),
        InitConfig { enable_stdout: false },
    )
    .expect("init tracing");

    info!("starting service");
    warn!(serviceName = "spoofed", user_id = 42, "login throttled");
    error!(reason = "invalid password", "authentication failed");
    error!(level = "fatal", "keystore unreadable");

    for item in provider.client().items() {
        match item {
            Tracked::Trace(t) => println!("trace    {:?} {} {:?}", t.severity, t.message, t.properties),
            Tracked::Request(r) => println!("request  {} {} {:?}", r.name, r.url, r.duration),
            Tracked::Exception(e) => println!("exception {}", e.exception),
        }
    }
}
