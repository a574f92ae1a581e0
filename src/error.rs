use reqwest::StatusCode;
use serde_json::Value as JsonValue;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum VpcError {
    /// Local parameter validation failure. Raised before any network activity.
    #[error("{0}")]
    Validation(String),
    /// No usable authenticator or service configuration could be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Connection, DNS, timeout or body transfer failure.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// Whether the failure was a request timeout.
        timeout: bool,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// Non-success HTTP status with the parsed error payload.
    #[error("http error {status}: {message}")]
    Http {
        status: u16,
        /// Message extracted from the error body, or the reason phrase.
        message: String,
        /// Error code reported by the service, when present.
        code: Option<String>,
        /// Parsed JSON error body, when the body was JSON.
        body: Option<JsonValue>,
    },
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl VpcError {
    /// Builds the validation error listing every missing parameter in order.
    pub fn missing_parameters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        Self::Validation(format!("Missing required parameters: {}", names.join(", ")))
    }

    /// Wraps a transport-level `reqwest` failure.
    pub fn transport(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            timeout: err.is_timeout(),
            source: Some(err),
        }
    }

    /// Transport failure without an underlying `reqwest` error.
    ///
    /// Used by custom [`crate::Transport`] implementations.
    pub fn transport_message(message: impl Into<String>, timeout: bool) -> Self {
        Self::Transport {
            message: message.into(),
            timeout,
            source: None,
        }
    }

    /// Returns `true` for failures a retry may cure: transport errors,
    /// `429 Too Many Requests` and any `5xx`.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Validation(_) | Self::Configuration(_) | Self::Decode(_) => false,
        }
    }

    /// HTTP status of an [`VpcError::Http`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Normalizes a non-success response into [`VpcError::Http`].
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<JsonValue>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| default_message(status));
        let code = parsed.as_ref().and_then(error_code);

        Self::Http {
            status,
            message,
            code,
            body: parsed,
        }
    }
}

fn error_message(body: &JsonValue) -> Option<String> {
    let first_error = body
        .get("errors")
        .and_then(JsonValue::as_array)
        .and_then(|errors| errors.first());

    first_error
        .and_then(|error| error.get("message"))
        .or_else(|| body.get("error"))
        .or_else(|| body.get("message"))
        .or_else(|| body.get("errorMessage"))
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
}

fn error_code(body: &JsonValue) -> Option<String> {
    let first_error = body
        .get("errors")
        .and_then(JsonValue::as_array)
        .and_then(|errors| errors.first());

    first_error
        .and_then(|error| error.get("code"))
        .or_else(|| body.get("code"))
        .and_then(|code| match code {
            JsonValue::String(code) => Some(code.clone()),
            JsonValue::Number(code) => Some(code.to_string()),
            _ => None,
        })
}

fn default_message(status: u16) -> String {
    if status == 401 {
        return "Access is denied due to invalid credentials.".to_owned();
    }
    StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown error")
        .to_owned()
}
