//! A rejection raised before any transport subscribed must not hide the
//! next panic. Own binary: the panic hook may not be installed yet.

use std::panic;
use std::sync::Arc;

use tracing_appinsights::client::memory::MemoryProvider;
use tracing_appinsights::options::AppInsightsOptions;
use tracing_appinsights::reporter::{PanicRuntime, ProcessError, Rejection};
use tracing_appinsights::AppInsightsTransport;

#[test]
fn test_panic_after_early_rejection_is_reported() {
    let outcome = panic::catch_unwind(|| {
        PanicRuntime::reject(ProcessError::new("Timeout", "nobody listening"));
    });
    let payload = outcome.unwrap_err();
    let rejection = payload.downcast_ref::<Rejection>().unwrap();
    assert_eq!(rejection.0.type_name, "Timeout");

    let provider = MemoryProvider::new();
    let _transport =
        AppInsightsTransport::new(AppInsightsOptions::new("key"), &provider, Arc::new(PanicRuntime::new()))
            .unwrap();

    let _ = panic::catch_unwind(|| panic!("real crash"));

    let exceptions = provider.client().exceptions();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].exception.type_name, "panic");
    assert_eq!(exceptions[0].exception.message, "real crash");
}
