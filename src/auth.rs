//! Authenticators decorate outgoing requests with credentials.
//!
//! The variant set is closed: [`NoAuthAuthenticator`], [`BasicAuthenticator`],
//! [`BearerTokenAuthenticator`], [`ApiKeyAuthenticator`],
//! [`IamAuthenticator`] and [`ContainerAuthenticator`]. When a client is
//! built without one, a [`CredentialDiscovery`] derives it from the
//! environment.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};

use crate::config::{read_external_sources, Environment, ServiceProperties};
use crate::token::{Grant, TokenManager, TokenServiceOptions, DEFAULT_CR_TOKEN_FILENAME};
use crate::{ClientOptions, RequestDescriptor, Result, VpcError};

/// Header used by [`ApiKeyAuthenticator`] unless configured otherwise.
pub const DEFAULT_APIKEY_HEADER: &str = "X-API-Key";

/// Kind of an [`Authenticator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthType {
    NoAuth,
    Basic,
    BearerToken,
    ApiKey,
    Iam,
    Container,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAuth => "noAuth",
            Self::Basic => "basic",
            Self::BearerToken => "bearerToken",
            Self::ApiKey => "apikey",
            Self::Iam => "iam",
            Self::Container => "container",
        }
    }

    /// Parses a configured auth type, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::NoAuth,
            Self::Basic,
            Self::BearerToken,
            Self::ApiKey,
            Self::Iam,
            Self::Container,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decorates request descriptors with credentials.
///
/// `authenticate` returns a decorated copy; the input is left untouched so a
/// retry can authenticate the original descriptor again.
#[async_trait]
pub trait Authenticator: fmt::Debug + Send + Sync {
    fn auth_type(&self) -> AuthType;

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor>;
}

/// Supplies an authenticator when the caller did not configure one.
pub trait CredentialDiscovery: Send + Sync {
    fn discover(&self, service_name: &str) -> Result<Arc<dyn Authenticator>>;
}

/// Returns the caller's authenticator, or runs `discovery` when there is none.
pub fn resolve_authenticator(
    options: &ClientOptions,
    service_name: &str,
    discovery: &dyn CredentialDiscovery,
) -> Result<Arc<dyn Authenticator>> {
    if let Some(authenticator) = &options.authenticator {
        return Ok(Arc::clone(authenticator));
    }

    let authenticator = discovery.discover(service_name)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        service = service_name,
        auth_type = %authenticator.auth_type(),
        "discovered authenticator"
    );

    Ok(authenticator)
}

/// Discovers credentials from a credentials file or environment variables.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentDiscovery {
    env: Environment,
}

impl EnvironmentDiscovery {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }
}

impl CredentialDiscovery for EnvironmentDiscovery {
    fn discover(&self, service_name: &str) -> Result<Arc<dyn Authenticator>> {
        let properties = read_external_sources(service_name, &self.env);
        if properties.is_empty() {
            return Err(VpcError::Configuration(format!(
                "no credentials found for service '{service_name}'"
            )));
        }
        authenticator_from_properties(&properties)
    }
}

/// Builds the authenticator described by external properties.
///
/// `AUTH_TYPE` selects the variant; without it, `iam` is assumed when an
/// `APIKEY` is present.
pub fn authenticator_from_properties(
    properties: &ServiceProperties,
) -> Result<Arc<dyn Authenticator>> {
    let auth_type = match properties.get("AUTH_TYPE") {
        Some(value) => AuthType::parse(value)
            .ok_or_else(|| VpcError::Configuration(format!("unsupported auth type '{value}'")))?,
        None if properties.get("APIKEY").is_some() => AuthType::Iam,
        None => {
            return Err(VpcError::Configuration(
                "no auth type configured and no API key found".to_owned(),
            ))
        }
    };

    let token_options = || TokenServiceOptions {
        url: properties.get("AUTH_URL").map(str::to_owned),
        client_id: properties.get("CLIENT_ID").map(str::to_owned),
        client_secret: properties.get("CLIENT_SECRET").map(str::to_owned),
        disable_ssl_verification: properties.flag("AUTH_DISABLE_SSL"),
        timeout: None,
    };

    let authenticator: Arc<dyn Authenticator> = match auth_type {
        AuthType::NoAuth => Arc::new(NoAuthAuthenticator),
        AuthType::Basic => Arc::new(BasicAuthenticator::new(
            properties.get("USERNAME").unwrap_or_default(),
            properties.get("PASSWORD").unwrap_or_default(),
        )?),
        AuthType::BearerToken => Arc::new(BearerTokenAuthenticator::new(
            properties.get("BEARER_TOKEN").unwrap_or_default(),
        )?),
        AuthType::ApiKey => {
            let authenticator = ApiKeyAuthenticator::new(properties.get("APIKEY").unwrap_or_default())?;
            match properties.get("APIKEY_HEADER") {
                Some(header) => Arc::new(authenticator.with_header(header)?),
                None => Arc::new(authenticator),
            }
        }
        AuthType::Iam => Arc::new(IamAuthenticator::new(
            properties.get("APIKEY").unwrap_or_default(),
            token_options(),
        )?),
        AuthType::Container => Arc::new(ContainerAuthenticator::new(
            ContainerOptions {
                cr_token_filename: properties.get("CR_TOKEN_FILENAME").map(PathBuf::from),
                profile_name: properties.get("IAM_PROFILE_NAME").map(str::to_owned),
                profile_id: properties.get("IAM_PROFILE_ID").map(str::to_owned),
            },
            token_options(),
        )?),
    };
    Ok(authenticator)
}

/// Performs no authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuthAuthenticator;

#[async_trait]
impl Authenticator for NoAuthAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::NoAuth
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        Ok(descriptor.clone())
    }
}

/// Sends `Authorization: Basic <base64(username:password)>`.
#[derive(Clone)]
pub struct BasicAuthenticator {
    authorization: String,
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("authorization", &"<redacted>")
            .finish()
    }
}

impl BasicAuthenticator {
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Result<Self> {
        let username = validate_credential("username", username.as_ref())?;
        let password = validate_credential("password", password.as_ref())?;
        let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
        Ok(Self {
            authorization: format!("Basic {encoded}"),
        })
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::Basic
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        with_sensitive_header(descriptor, AUTHORIZATION, &self.authorization)
    }
}

/// Sends a caller-managed bearer token.
pub struct BearerTokenAuthenticator {
    token: RwLock<String>,
}

impl fmt::Debug for BearerTokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenAuthenticator")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        let token = validate_credential("bearer token", token.as_ref())?;
        Ok(Self {
            token: RwLock::new(token.to_owned()),
        })
    }

    /// Replaces the token used by subsequent requests.
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::BearerToken
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        let authorization = {
            let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
            format!("Bearer {token}")
        };
        with_sensitive_header(descriptor, AUTHORIZATION, &authorization)
    }
}

/// Sends a static API key in a request header.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    header: HeaderName,
    key: String,
}

impl fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthenticator")
            .field("header", &self.header)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ApiKeyAuthenticator {
    pub fn new(key: impl AsRef<str>) -> Result<Self> {
        let key = validate_credential("apikey", key.as_ref())?;
        Ok(Self {
            header: HeaderName::from_static("x-api-key"),
            key: key.to_owned(),
        })
    }

    /// Sends the key in `header` instead of [`DEFAULT_APIKEY_HEADER`].
    pub fn with_header(mut self, header: &str) -> Result<Self> {
        self.header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|_| VpcError::Configuration(format!("invalid API key header '{header}'")))?;
        Ok(self)
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::ApiKey
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        with_sensitive_header(descriptor, self.header.clone(), &self.key)
    }
}

/// Exchanges an API key for short-lived bearer tokens.
#[derive(Debug)]
pub struct IamAuthenticator {
    tokens: TokenManager,
}

impl IamAuthenticator {
    pub fn new(apikey: impl AsRef<str>, options: TokenServiceOptions) -> Result<Self> {
        let apikey = validate_credential("apikey", apikey.as_ref())?;
        Ok(Self {
            tokens: TokenManager::new(Grant::ApiKey(apikey.to_owned()), options)?,
        })
    }
}

#[async_trait]
impl Authenticator for IamAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::Iam
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        let token = self.tokens.access_token().await?;
        with_sensitive_header(descriptor, AUTHORIZATION, &format!("Bearer {token}"))
    }
}

/// Settings for [`ContainerAuthenticator`].
#[derive(Clone, Debug, Default)]
pub struct ContainerOptions {
    /// Compute-resource token file, re-read on every token refresh.
    pub cr_token_filename: Option<PathBuf>,
    pub profile_name: Option<String>,
    pub profile_id: Option<String>,
}

/// Exchanges a compute-resource token read from a file for bearer tokens.
#[derive(Debug)]
pub struct ContainerAuthenticator {
    tokens: TokenManager,
}

impl ContainerAuthenticator {
    pub fn new(options: ContainerOptions, token_options: TokenServiceOptions) -> Result<Self> {
        if options.profile_name.is_none() && options.profile_id.is_none() {
            return Err(VpcError::Configuration(
                "container authentication requires a profile name or profile id".to_owned(),
            ));
        }
        let grant = Grant::CrToken {
            filename: options
                .cr_token_filename
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CR_TOKEN_FILENAME)),
            profile_name: options.profile_name,
            profile_id: options.profile_id,
        };
        Ok(Self {
            tokens: TokenManager::new(grant, token_options)?,
        })
    }
}

#[async_trait]
impl Authenticator for ContainerAuthenticator {
    fn auth_type(&self) -> AuthType {
        AuthType::Container
    }

    async fn authenticate(&self, descriptor: &RequestDescriptor) -> Result<RequestDescriptor> {
        let token = self.tokens.access_token().await?;
        with_sensitive_header(descriptor, AUTHORIZATION, &format!("Bearer {token}"))
    }
}

fn with_sensitive_header(
    descriptor: &RequestDescriptor,
    name: HeaderName,
    value: &str,
) -> Result<RequestDescriptor> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| VpcError::Configuration(format!("credential is not a valid '{name}' value")))?;
    value.set_sensitive(true);

    let mut decorated = descriptor.clone();
    decorated.headers.insert(name, value);
    Ok(decorated)
}

fn validate_credential<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(VpcError::Configuration(format!("the {name} is required")));
    }
    let wrapped = |c: char| c == '{' || c == '}' || c == '"';
    if value.starts_with(wrapped) || value.ends_with(wrapped) {
        return Err(VpcError::Configuration(format!(
            "the {name} must not start or end with curly brackets or quotes"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::header::AUTHORIZATION;

    use super::{
        authenticator_from_properties, resolve_authenticator, ApiKeyAuthenticator, AuthType,
        Authenticator, BasicAuthenticator, BearerTokenAuthenticator, ContainerAuthenticator,
        ContainerOptions, CredentialDiscovery, NoAuthAuthenticator,
    };
    use crate::config::ServiceProperties;
    use crate::token::TokenServiceOptions;
    use crate::{ClientOptions, Method, RequestDescriptor, Result, VpcError};

    struct CountingDiscovery(AtomicUsize);

    impl CredentialDiscovery for CountingDiscovery {
        fn discover(&self, _service_name: &str) -> Result<Arc<dyn Authenticator>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoAuthAuthenticator))
        }
    }

    fn properties(pairs: &[(&str, &str)]) -> ServiceProperties {
        ServiceProperties::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn explicit_authenticator_skips_discovery() {
        let discovery = CountingDiscovery(AtomicUsize::new(0));
        let explicit: Arc<dyn Authenticator> =
            Arc::new(BearerTokenAuthenticator::new("tok").expect("valid token"));
        let options = ClientOptions {
            authenticator: Some(explicit),
            ..ClientOptions::default()
        };

        let resolved = resolve_authenticator(&options, "vpc", &discovery).expect("resolves");
        assert_eq!(resolved.auth_type(), AuthType::BearerToken);
        assert_eq!(discovery.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_authenticator_runs_discovery_once() {
        let discovery = CountingDiscovery(AtomicUsize::new(0));
        let resolved =
            resolve_authenticator(&ClientOptions::default(), "vpc", &discovery).expect("resolves");
        assert_eq!(resolved.auth_type(), AuthType::NoAuth);
        assert_eq!(discovery.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auth_type_parse_ignores_case() {
        assert_eq!(AuthType::parse("NOAUTH"), Some(AuthType::NoAuth));
        assert_eq!(AuthType::parse("bearertoken"), Some(AuthType::BearerToken));
        assert_eq!(AuthType::parse(" iam "), Some(AuthType::Iam));
        assert_eq!(AuthType::parse("kerberos"), None);
    }

    #[test]
    fn properties_select_variant() {
        let cases = [
            (vec![("AUTH_TYPE", "noauth")], AuthType::NoAuth),
            (
                vec![("AUTH_TYPE", "basic"), ("USERNAME", "u"), ("PASSWORD", "p")],
                AuthType::Basic,
            ),
            (
                vec![("AUTH_TYPE", "bearerToken"), ("BEARER_TOKEN", "t")],
                AuthType::BearerToken,
            ),
            (vec![("AUTH_TYPE", "apikey"), ("APIKEY", "k")], AuthType::ApiKey),
            (vec![("APIKEY", "k")], AuthType::Iam),
            (
                vec![("AUTH_TYPE", "container"), ("IAM_PROFILE_NAME", "p")],
                AuthType::Container,
            ),
        ];
        for (pairs, expected) in cases {
            let authenticator =
                authenticator_from_properties(&properties(&pairs)).expect("authenticator builds");
            assert_eq!(authenticator.auth_type(), expected);
        }
    }

    #[test]
    fn properties_without_credentials_fail() {
        let err = authenticator_from_properties(&properties(&[("URL", "https://x")]))
            .expect_err("must fail");
        assert!(matches!(err, VpcError::Configuration(_)));

        let err = authenticator_from_properties(&properties(&[("AUTH_TYPE", "basic")]))
            .expect_err("basic without username must fail");
        assert!(matches!(err, VpcError::Configuration(_)));

        let err = authenticator_from_properties(&properties(&[("AUTH_TYPE", "ldap")]))
            .expect_err("unknown type must fail");
        assert!(err.to_string().contains("ldap"));
    }

    #[test]
    fn credentials_wrapped_in_braces_are_rejected() {
        assert!(BasicAuthenticator::new("{user}", "pass").is_err());
        assert!(BearerTokenAuthenticator::new("\"token\"").is_err());
        assert!(ApiKeyAuthenticator::new("").is_err());
    }

    #[test]
    fn container_requires_profile() {
        let err = ContainerAuthenticator::new(ContainerOptions::default(), TokenServiceOptions::default())
            .expect_err("must fail");
        assert!(matches!(err, VpcError::Configuration(_)));
    }

    #[tokio::test]
    async fn basic_sets_authorization_without_touching_input() {
        let authenticator = BasicAuthenticator::new("user", "pass").expect("valid");
        let descriptor = RequestDescriptor::new(Method::Get, "/vpcs");

        let decorated = authenticator.authenticate(&descriptor).await.expect("authenticates");
        assert_eq!(decorated.headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
        assert!(decorated.headers[AUTHORIZATION].is_sensitive());
        assert!(descriptor.headers.is_empty());
    }

    #[tokio::test]
    async fn bearer_token_can_be_replaced() {
        let authenticator = BearerTokenAuthenticator::new("first").expect("valid");
        let descriptor = RequestDescriptor::new(Method::Get, "/vpcs");

        let decorated = authenticator.authenticate(&descriptor).await.expect("authenticates");
        assert_eq!(decorated.headers[AUTHORIZATION], "Bearer first");

        authenticator.set_bearer_token("second");
        let decorated = authenticator.authenticate(&descriptor).await.expect("authenticates");
        assert_eq!(decorated.headers[AUTHORIZATION], "Bearer second");
    }

    #[tokio::test]
    async fn apikey_uses_configured_header() {
        let authenticator = ApiKeyAuthenticator::new("k-123")
            .and_then(|auth| auth.with_header("X-Auth-Key"))
            .expect("valid");
        let decorated = authenticator
            .authenticate(&RequestDescriptor::new(Method::Get, "/vpcs"))
            .await
            .expect("authenticates");
        assert_eq!(decorated.headers["x-auth-key"], "k-123");
        assert!(decorated.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let basic = BasicAuthenticator::new("user", "hunter2").expect("valid");
        let bearer = BearerTokenAuthenticator::new("tok-secret").expect("valid");
        let apikey = ApiKeyAuthenticator::new("key-secret").expect("valid");
        let debug = format!("{basic:?} {bearer:?} {apikey:?}");
        assert!(!debug.contains("dXNlcjpodW50ZXIy"));
        assert!(!debug.contains("tok-secret"));
        assert!(!debug.contains("key-secret"));
    }
}
