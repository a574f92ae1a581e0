//! Access-token exchange and caching for the IAM and container authenticators.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::operation::JSON;
use crate::options::DEFAULT_TIMEOUT_MS;
use crate::{Result, VpcError};

/// Default token service base URL.
pub const DEFAULT_AUTH_URL: &str = "https://iam.cloud.ibm.com";
/// Default location of the compute-resource token inside a container.
pub const DEFAULT_CR_TOKEN_FILENAME: &str = "/var/run/secrets/tokens/vault-token";

const TOKEN_PATH: &str = "/identity/token";
const APIKEY_GRANT: &str = "urn:ibm:params:oauth:grant-type:apikey";
const CR_TOKEN_GRANT: &str = "urn:ibm:params:oauth:grant-type:cr-token";
const DEFAULT_LIFETIME_SECS: u64 = 3600;
// Tokens are refreshed once this share of their lifetime has elapsed.
const REFRESH_FRACTION: f64 = 0.8;

/// Token service connection settings shared by token-based authenticators.
#[derive(Clone, Default)]
pub struct TokenServiceOptions {
    /// Token service base URL; `/identity/token` is appended.
    pub url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub disable_ssl_verification: bool,
    /// Limit for one token exchange. Defaults to the service request timeout.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for TokenServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenServiceOptions")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) enum Grant {
    ApiKey(String),
    CrToken {
        filename: PathBuf,
        profile_name: Option<String>,
        profile_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Fetches access tokens for one grant and caches them until refresh time.
pub(crate) struct TokenManager {
    http: reqwest::Client,
    url: String,
    grant: Grant,
    client_credentials: Option<(String, String)>,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grant = match &self.grant {
            Grant::ApiKey(_) => "apikey",
            Grant::CrToken { .. } => "cr-token",
        };
        f.debug_struct("TokenManager")
            .field("url", &self.url)
            .field("grant", &grant)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

impl TokenManager {
    pub(crate) fn new(grant: Grant, options: TokenServiceOptions) -> Result<Self> {
        let client_credentials = match (options.client_id, options.client_secret) {
            (Some(id), Some(secret)) => Some((id, secret)),
            (None, None) => None,
            _ => {
                return Err(VpcError::Configuration(
                    "client_id and client_secret must be supplied together".to_owned(),
                ))
            }
        };
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(options.disable_ssl_verification)
            .timeout(timeout)
            .build()
            .map_err(|err| VpcError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            url: options.url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_owned()),
            grant,
            client_credentials,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid access token, exchanging a new one when the cached
    /// token is absent or due for refresh.
    pub(crate) async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|token| Instant::now() < token.refresh_at)
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(4);
        match &self.grant {
            Grant::ApiKey(apikey) => {
                form.push(("grant_type", APIKEY_GRANT.to_owned()));
                form.push(("apikey", apikey.clone()));
                form.push(("response_type", "cloud_iam".to_owned()));
            }
            Grant::CrToken {
                filename,
                profile_name,
                profile_id,
            } => {
                let cr_token = std::fs::read_to_string(filename).map_err(|err| {
                    VpcError::Configuration(format!(
                        "unable to read compute resource token from '{}': {err}",
                        filename.display()
                    ))
                })?;
                form.push(("grant_type", CR_TOKEN_GRANT.to_owned()));
                form.push(("cr_token", cr_token.trim().to_owned()));
                if let Some(name) = profile_name {
                    form.push(("profile_name", name.clone()));
                }
                if let Some(id) = profile_id {
                    form.push(("profile_id", id.clone()));
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.url, "requesting access token");

        let mut request = self
            .http
            .post(format!("{}{TOKEN_PATH}", self.url.trim_end_matches('/')))
            .header(ACCEPT, JSON)
            .form(&form);
        if let Some((id, secret)) = &self.client_credentials {
            request = request.basic_auth(id, Some(secret));
        }

        let response = request.send().await.map_err(VpcError::transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(VpcError::transport)?;
        if !(200..300).contains(&status) {
            return Err(VpcError::from_response(status, &body));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|err| VpcError::Decode(format!("invalid token response: {err}")))?;
        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS));

        Ok(CachedToken {
            access_token: parsed.access_token,
            refresh_at: Instant::now() + lifetime.mul_f64(REFRESH_FRACTION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Grant, TokenManager, TokenServiceOptions, DEFAULT_AUTH_URL};
    use crate::VpcError;

    #[test]
    fn default_url_is_used() {
        let manager = TokenManager::new(
            Grant::ApiKey("key".to_owned()),
            TokenServiceOptions::default(),
        )
        .expect("manager builds");
        assert_eq!(manager.url, DEFAULT_AUTH_URL);
    }

    #[test]
    fn client_credentials_must_be_paired() {
        let err = TokenManager::new(
            Grant::ApiKey("key".to_owned()),
            TokenServiceOptions {
                client_id: Some("bx".to_owned()),
                ..TokenServiceOptions::default()
            },
        )
        .expect_err("half-configured client credentials must fail");
        assert!(matches!(err, VpcError::Configuration(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let manager = TokenManager::new(
            Grant::ApiKey("super-secret".to_owned()),
            TokenServiceOptions {
                client_id: Some("bx".to_owned()),
                client_secret: Some("hidden".to_owned()),
                ..TokenServiceOptions::default()
            },
        )
        .expect("manager builds");
        let debug = format!("{manager:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("hidden"));
    }
}
