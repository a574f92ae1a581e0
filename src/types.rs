use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::Value as JsonValue;

use crate::transport::HttpResponse;
use crate::{Result, VpcError};

/// Successful operation result.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Decoded body: JSON when possible, `Null` when empty, otherwise text.
    pub result: JsonValue,
}

impl DetailedResponse {
    pub(crate) fn from_http(response: HttpResponse) -> Result<Self> {
        let declared_json = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("json"));

        let result = if response.body.iter().all(u8::is_ascii_whitespace) {
            JsonValue::Null
        } else {
            match declared_json {
                Some(true) => serde_json::from_slice(&response.body).map_err(|err| {
                    VpcError::Decode(format!(
                        "invalid JSON response: {err}; body: {}",
                        String::from_utf8_lossy(&response.body)
                    ))
                })?,
                Some(false) => JsonValue::String(String::from_utf8_lossy(&response.body).into_owned()),
                None => serde_json::from_slice(&response.body).unwrap_or_else(|_| {
                    JsonValue::String(String::from_utf8_lossy(&response.body).into_owned())
                }),
            }
        };

        Ok(Self {
            status: response.status,
            headers: response.headers,
            result,
        })
    }
}
