//! Configuration resolution: explicit options, then external sources, then
//! defaults.
//!
//! External sources for a service named `vpc` are read under the `VPC_`
//! prefix, first from a credentials file and otherwise from environment
//! variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{resolve_authenticator, CredentialDiscovery};
use crate::options::{DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_URL, DEFAULT_TIMEOUT_MS};
use crate::{ClientOptions, Result, ServiceOptions};

/// Environment variable naming an explicit credentials file.
pub const CREDENTIALS_FILE_ENV: &str = "CREDENTIALS_FILE";
/// Credentials file looked up in the working and home directories.
pub const DEFAULT_CREDENTIALS_FILE_NAME: &str = "credentials.env";

/// Snapshot of environment variables and the working directory.
///
/// Captured once so resolution is deterministic and tests can supply their
/// own values. Without a working directory, `./credentials.env` is not
/// consulted.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl Environment {
    /// Captures the current process environment and working directory.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            working_dir: std::env::current_dir().ok(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            working_dir: None,
        }
    }

    /// Directory searched for a local credentials file.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns a non-empty variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Properties found for one service, keyed without the service prefix
/// (`AUTH_TYPE`, `APIKEY`, `URL`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceProperties {
    values: HashMap<String, String>,
}

impl ServiceProperties {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(key, value)| (key.to_owned(), value.trim().to_owned()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Interprets a property as a boolean flag; only `true` (any case) is set.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn with_prefix<'a>(
        prefix: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self::from_pairs(
            pairs
                .into_iter()
                .filter_map(|(key, value)| Some((key.strip_prefix(prefix)?, value))),
        )
    }
}

/// Environment variable prefix for a service name: `vpc-beta` becomes `VPC_BETA_`.
pub fn property_prefix(service_name: &str) -> String {
    format!("{}_", service_name.to_ascii_uppercase().replace('-', "_"))
}

/// Reads the properties of `service_name` from the first external source
/// that has any.
pub fn read_external_sources(service_name: &str, env: &Environment) -> ServiceProperties {
    let prefix = property_prefix(service_name);

    if let Some(path) = credentials_file_path(env) {
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let pairs = parse_credentials_file(&contents);
                let properties = ServiceProperties::with_prefix(
                    &prefix,
                    pairs.iter().map(|(key, value)| (key.as_str(), value.as_str())),
                );
                if !properties.is_empty() {
                    return properties;
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(path = %path.display(), error = %_err, "credentials file not readable");
            }
        }
    }

    ServiceProperties::with_prefix(
        &prefix,
        env.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )
}

fn credentials_file_path(env: &Environment) -> Option<PathBuf> {
    if let Some(path) = env.get(CREDENTIALS_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    if let Some(local) = env
        .working_dir
        .as_ref()
        .map(|dir| dir.join(DEFAULT_CREDENTIALS_FILE_NAME))
        .filter(|path| path.is_file())
    {
        return Some(local);
    }
    env.get("HOME")
        .map(|home| Path::new(home).join(DEFAULT_CREDENTIALS_FILE_NAME))
        .filter(|path| path.is_file())
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped and
/// surrounding quotes are stripped from values.
pub fn parse_credentials_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_owned(), value.to_owned()))
        })
        .collect()
}

/// Merges explicit options, external sources and defaults into
/// [`ServiceOptions`].
///
/// Fails only when no authenticator was supplied and discovery fails.
pub fn resolve(
    options: ClientOptions,
    env: &Environment,
    discovery: &dyn CredentialDiscovery,
) -> Result<ServiceOptions> {
    let service_name = options
        .service_name
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned());
    let authenticator = resolve_authenticator(&options, &service_name, discovery)?;
    let external = read_external_sources(&service_name, env);

    let service_url = options
        .service_url
        .or_else(|| external.get("URL").map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_owned());
    let disable_ssl_verification = options
        .disable_ssl_verification
        .unwrap_or_else(|| external.flag("DISABLE_SSL"));

    Ok(ServiceOptions {
        service_url,
        authenticator,
        service_name,
        version: options
            .version
            .or_else(|| external.get("VERSION").map(str::to_owned)),
        disable_ssl_verification,
        timeout: Duration::from_millis(options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        enable_gzip: options.enable_gzip,
        default_headers: options.headers,
    })
}
