//! Environment variable names used by this crate for convenient
//! configuration from services.
//!
//! These are purely helpers; the transport and clients remain decoupled
//! from environment access.

use crate::error::UnknownLevelError;
use crate::options::AppInsightsOptions;
use crate::severity::LevelToken;

/// Instrumentation key of the target resource.
pub const APPINSIGHTS_INSTRUMENTATIONKEY_ENV: &str = "APPINSIGHTS_INSTRUMENTATIONKEY";

/// Ingestion host, e.g. `https://dc.services.visualstudio.com`.
pub const APPINSIGHTS_ENDPOINT_URL_ENV: &str = "APPINSIGHTS_ENDPOINT_URL";

/// Least severe level forwarded (`fatal` .. `debug`).
pub const APPINSIGHTS_MIN_LEVEL_ENV: &str = "APPINSIGHTS_MIN_LEVEL";

/// `false` or `0` stops panics from being reported.
pub const APPINSIGHTS_REPORT_SYNC_UNCAUGHT_ENV: &str = "APPINSIGHTS_REPORT_SYNC_UNCAUGHT";

/// Logical service name; attached as the `serviceName` custom field and
/// reported as the cloud role.
pub const APPINSIGHTS_SERVICE_NAME_ENV: &str = "APPINSIGHTS_SERVICE_NAME";

/// Custom field carrying the service name.
pub const SERVICE_NAME_FIELD: &str = "serviceName";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppInsightsOptions {
    /// Build options from the process environment.
    ///
    /// A missing instrumentation key yields an empty one, which clients
    /// refuse when started.
    pub fn from_env() -> Result<Self, UnknownLevelError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build options from any key/value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, UnknownLevelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options =
            AppInsightsOptions::new(lookup(APPINSIGHTS_INSTRUMENTATIONKEY_ENV).unwrap_or_default());

        if let Some(level) = lookup(APPINSIGHTS_MIN_LEVEL_ENV) {
            options = options.level(level.trim().parse::<LevelToken>()?);
        }
        if let Some(flag) = lookup(APPINSIGHTS_REPORT_SYNC_UNCAUGHT_ENV) {
            let flag = flag.trim();
            options = options.report_sync_uncaught(!(flag.eq_ignore_ascii_case("false") || flag == "0"));
        }
        if let Some(service) = lookup(APPINSIGHTS_SERVICE_NAME_ENV) {
            options = options.custom_field(SERVICE_NAME_FIELD, service);
        }
        Ok(options)
    }
}

#[cfg(feature = "http")]
impl crate::client::http::HttpClientConfig {
    /// Defaults overridden by the endpoint and service name variables.
    pub fn from_env() -> Self {
        Self {
            endpoint_url: env_or(APPINSIGHTS_ENDPOINT_URL_ENV, crate::client::http::DEFAULT_ENDPOINT_URL),
            role_name: std::env::var(APPINSIGHTS_SERVICE_NAME_ENV).ok(),
            ..Self::default()
        }
    }
}
