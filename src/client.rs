use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::{
    auth::{CredentialDiscovery, EnvironmentDiscovery},
    catalog,
    config::{self, Environment},
    dispatch::Dispatcher,
    operation::{self, merge_headers},
    transport::{ReqwestTransport, Transport},
    ClientOptions, DetailedResponse, OperationSpec, Params, QueryValue, RequestDescriptor, Result,
    RetryOptions, RetryPolicy, ServiceOptions, SharedRetryPolicy,
};

const SDK_USER_AGENT: &str = concat!("vpc-client/", env!("CARGO_PKG_VERSION"), " (lang=rust)");

/// Async client for the VPC REST API.
///
/// Operations are invoked from their [`OperationSpec`]; retries are off until
/// [`VpcClient::enable_retries`] is called. Clones share configuration and
/// the retry toggle.
#[derive(Clone)]
pub struct VpcClient {
    options: Arc<ServiceOptions>,
    transport: Arc<dyn Transport>,
    retry: SharedRetryPolicy,
}

impl fmt::Debug for VpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VpcClient")
            .field("service_url", &self.options.service_url())
            .field("service_name", &self.options.service_name())
            .field("auth_type", &self.options.authenticator().auth_type())
            .field("retry", &self.retry.get())
            .finish()
    }
}

impl VpcClient {
    /// Creates a client, discovering credentials from the process
    /// environment when `options` carries no authenticator.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let env = Environment::from_process();
        let discovery = EnvironmentDiscovery::new(env.clone());
        Self::new_with(options, &env, &discovery)
    }

    /// Creates a client entirely from external configuration.
    ///
    /// Reads `VPC_AUTH_TYPE`, `VPC_URL` and related variables, or a
    /// credentials file named by `CREDENTIALS_FILE`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::default())
    }

    /// Creates a client with an explicit environment and discovery strategy.
    pub fn new_with(
        options: ClientOptions,
        env: &Environment,
        discovery: &dyn CredentialDiscovery,
    ) -> Result<Self> {
        let resolved = config::resolve(options, env, discovery)?;
        let transport = ReqwestTransport::new(
            resolved.timeout(),
            resolved.disable_ssl_verification(),
            resolved.enable_gzip(),
        )?;

        Ok(Self {
            options: Arc::new(resolved),
            transport: Arc::new(transport),
            retry: SharedRetryPolicy::default(),
        })
    }

    /// Replaces the HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Resolved configuration.
    pub fn base_options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Turns retries on for all subsequent attempts, including retries of
    /// calls already in flight.
    pub fn enable_retries(&self, options: RetryOptions) {
        self.retry.set(RetryPolicy::enabled(options));
    }

    /// Turns retries off; every later attempt is final.
    pub fn disable_retries(&self) {
        self.retry.set(RetryPolicy::disabled());
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.get()
    }

    /// Builds the unauthenticated descriptor `invoke` would send.
    ///
    /// Client-wide headers apply only where neither the operation nor the
    /// caller set the same header, and the configured API version is added
    /// as the `version` query parameter.
    pub fn build_request(&self, operation: &OperationSpec, params: &Params) -> Result<RequestDescriptor> {
        let mut descriptor = operation::build(operation, params)?;

        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
        merge_headers(&mut defaults, self.options.default_headers())?;
        for (name, value) in &defaults {
            if !descriptor.headers.contains_key(name) {
                descriptor.headers.insert(name.clone(), value.clone());
            }
        }

        if let Some(version) = self.options.version() {
            if descriptor.query_value("version").is_none() {
                descriptor
                    .query_params
                    .push(("version".to_owned(), QueryValue::from(version)));
            }
        }

        Ok(descriptor)
    }

    /// Validates `params`, builds the request and dispatches it.
    ///
    /// Missing required parameters fail before any network activity.
    pub async fn invoke(&self, operation: &OperationSpec, params: Params) -> Result<DetailedResponse> {
        let descriptor = self.build_request(operation, &params)?;
        Dispatcher::new(self.transport.as_ref(), self.options.service_url())
            .execute(
                &descriptor,
                self.options.authenticator().as_ref(),
                &self.retry,
            )
            .await
    }

    /// Invokes a catalog operation by id, e.g. `"list_vpcs"`.
    pub async fn call(&self, operation_id: &str, params: Params) -> Result<DetailedResponse> {
        let operation = catalog::find_operation(operation_id)?;
        self.invoke(operation, params).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::header::USER_AGENT;

    use super::VpcClient;
    use crate::catalog::{GET_VPC, LIST_VPCS};
    use crate::config::Environment;
    use crate::{
        AuthType, BearerTokenAuthenticator, ClientOptions, EnvironmentDiscovery, Params,
        QueryValue, RetryOptions,
    };

    fn client(options: ClientOptions) -> VpcClient {
        let env = Environment::default();
        VpcClient::new_with(options, &env, &EnvironmentDiscovery::new(env.clone()))
            .expect("client builds")
    }

    fn bearer() -> Arc<BearerTokenAuthenticator> {
        Arc::new(BearerTokenAuthenticator::new("secret-token").expect("valid"))
    }

    #[test]
    fn version_is_added_to_query() {
        let client = client(
            ClientOptions::new()
                .with_authenticator(bearer())
                .with_version("2021-01-01"),
        );
        let descriptor = client
            .build_request(&LIST_VPCS, &Params::new().set("limit", 5))
            .expect("builds");
        assert_eq!(
            descriptor.query_value("version"),
            Some(&QueryValue::from("2021-01-01"))
        );
    }

    #[test]
    fn client_headers_have_lowest_precedence() {
        let client = client(
            ClientOptions::new()
                .with_authenticator(bearer())
                .with_header("Accept", "text/csv")
                .with_header("X-Correlation-Id", "abc"),
        );
        let descriptor = client
            .build_request(&GET_VPC, &Params::new().set("id", "r006-1"))
            .expect("builds");
        assert_eq!(descriptor.headers["accept"], "application/json");
        assert_eq!(descriptor.headers["x-correlation-id"], "abc");
        assert!(descriptor.headers[USER_AGENT]
            .to_str()
            .expect("ascii")
            .starts_with("vpc-client/"));
    }

    #[test]
    fn retry_toggles_are_shared_by_clones() {
        let client = client(ClientOptions::new().with_authenticator(bearer()));
        let clone = client.clone();
        assert!(!client.retry_policy().enabled);

        clone.enable_retries(RetryOptions::default());
        assert!(client.retry_policy().enabled);
        assert_eq!(client.retry_policy().max_retries, 4);

        client.disable_retries();
        assert!(!clone.retry_policy().enabled);
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = client(ClientOptions::new().with_authenticator(bearer()));
        let debug = format!("{client:?}");
        assert!(debug.contains("BearerToken"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn explicit_authenticator_is_kept() {
        let client = client(ClientOptions::new().with_authenticator(bearer()));
        assert_eq!(
            client.base_options().authenticator().auth_type(),
            AuthType::BearerToken
        );
    }
}
