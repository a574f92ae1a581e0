use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::Authenticator;

/// Service URL used when neither options nor external sources provide one.
pub const DEFAULT_SERVICE_URL: &str = "https://us-south.iaas.cloud.ibm.com/v1";
/// Service name used for external configuration lookup.
pub const DEFAULT_SERVICE_NAME: &str = "vpc";
/// Per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Caller-supplied client configuration. Every field is optional.
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub service_url: Option<String>,
    /// Name used to look up external configuration (`<NAME>_URL`, ...).
    pub service_name: Option<String>,
    /// Skips credential discovery when set.
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// API version date sent as the `version` query parameter.
    pub version: Option<String>,
    pub disable_ssl_verification: Option<bool>,
    pub timeout_ms: Option<u64>,
    /// Accept gzip-compressed responses.
    pub enable_gzip: bool,
    /// Headers sent with every request unless an operation overrides them.
    pub headers: Vec<(String, String)>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("service_url", &self.service_url)
            .field("service_name", &self.service_name)
            .field("authenticator", &self.authenticator)
            .field("version", &self.version)
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("timeout_ms", &self.timeout_ms)
            .field("enable_gzip", &self.enable_gzip)
            .field("headers", &RedactedHeaders(&self.headers))
            .finish()
    }
}

/// Resolved, immutable client configuration.
#[derive(Clone)]
pub struct ServiceOptions {
    pub(crate) service_url: String,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) service_name: String,
    pub(crate) version: Option<String>,
    pub(crate) disable_ssl_verification: bool,
    pub(crate) timeout: Duration,
    pub(crate) enable_gzip: bool,
    pub(crate) default_headers: Vec<(String, String)>,
}

impl ServiceOptions {
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn disable_ssl_verification(&self) -> bool {
        self.disable_ssl_verification
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn enable_gzip(&self) -> bool {
        self.enable_gzip
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("service_url", &self.service_url)
            .field("authenticator", &self.authenticator)
            .field("service_name", &self.service_name)
            .field("version", &self.version)
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("timeout", &self.timeout)
            .field("enable_gzip", &self.enable_gzip)
            .field("default_headers", &RedactedHeaders(&self.default_headers))
            .finish()
    }
}

// Header values may carry credentials; only names are printed.
struct RedactedHeaders<'a>(&'a [(String, String)]);

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, _)| (name, "<redacted>")))
            .finish()
    }
}
