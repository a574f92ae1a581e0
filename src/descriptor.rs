use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;
use url::{form_urlencoded::byte_serialize, Url};

use crate::{Result, VpcError};

/// HTTP method of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Uppercase method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value of one query parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryValue {
    Text(String),
    Bool(bool),
    Number(serde_json::Number),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// One outgoing HTTP request before authentication and transmission.
///
/// Descriptors are built fresh for every call and never mutated after being
/// handed to the dispatcher; authenticators return decorated copies.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the service URL, with `{name}` placeholders.
    pub url_template: String,
    pub path_params: BTreeMap<String, String>,
    /// Query pairs in send order. Keys repeat for array values.
    pub query_params: Vec<(String, QueryValue)>,
    pub headers: HeaderMap,
    pub body: Option<JsonValue>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url_template: impl Into<String>) -> Self {
        Self {
            method,
            url_template: url_template.into(),
            path_params: BTreeMap::new(),
            query_params: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Returns the first query value stored under `key`.
    pub fn query_value(&self, key: &str) -> Option<&QueryValue> {
        self.query_params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Substitutes path parameters into the template.
    ///
    /// Placeholders and `path_params` keys must match one to one.
    pub fn render_path(&self) -> Result<String> {
        let placeholders = placeholders(&self.url_template);

        if let Some(extra) = self
            .path_params
            .keys()
            .find(|key| !placeholders.contains(&key.as_str()))
        {
            return Err(VpcError::Validation(format!(
                "path parameter '{extra}' has no placeholder in '{}'",
                self.url_template
            )));
        }

        let mut rendered = self.url_template.clone();
        for name in placeholders {
            let value = self
                .path_params
                .get(name)
                .ok_or_else(|| VpcError::missing_parameters([name]))?;
            rendered = rendered.replace(&format!("{{{name}}}"), &encode_path_segment(value));
        }
        Ok(rendered)
    }

    /// Full request URL: service URL, rendered path and query string.
    pub fn url(&self, service_url: &str) -> Result<Url> {
        let path = self.render_path()?;
        let joined = format!("{}{}", service_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&joined)
            .map_err(|err| VpcError::Configuration(format!("invalid URL '{joined}': {err}")))?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, &value.to_string());
            }
        }
        Ok(url)
    }
}

/// Placeholder names of a `{name}` style template, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !names.contains(&name) {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    names
}

fn encode_path_segment(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
