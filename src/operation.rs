use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value as JsonValue};

use crate::descriptor::{Method, QueryValue, RequestDescriptor};
use crate::{Result, VpcError};

/// Default content type for JSON request bodies.
pub const JSON: &str = "application/json";
/// Content type used by partial-update (`PATCH`) operations.
pub const MERGE_PATCH_JSON: &str = "application/merge-patch+json";

/// Where an operation parameter lands in the outgoing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    /// Substituted into a `{wire_name}` placeholder.
    Path,
    /// Query string. Object values are flattened into dotted keys.
    Query,
    /// One field of the JSON body object.
    Body,
    /// The entire JSON body, sent verbatim.
    BodyRoot,
    /// A request header named `wire_name`.
    Header,
}

/// Declaration of one operation parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    /// Name used by callers in [`Params`].
    pub name: &'static str,
    /// Name used on the wire.
    pub wire_name: &'static str,
    pub location: ParamLocation,
    pub required: bool,
}

impl ParamSpec {
    pub const fn new(name: &'static str, wire_name: &'static str, location: ParamLocation) -> Self {
        Self {
            name,
            wire_name,
            location,
            required: false,
        }
    }

    pub const fn path(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ParamLocation::Path).required()
    }

    pub const fn query(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ParamLocation::Query)
    }

    pub const fn body(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ParamLocation::Body)
    }

    pub const fn body_root(name: &'static str) -> Self {
        Self::new(name, name, ParamLocation::BodyRoot)
    }

    pub const fn header(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ParamLocation::Header)
    }

    /// Marks the parameter as required.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declarative description of one REST operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationSpec {
    /// Stable operation identifier, e.g. `list_vpcs`.
    pub operation_id: &'static str,
    pub method: Method,
    /// Path template relative to the service URL.
    pub url_template: &'static str,
    pub params: &'static [ParamSpec],
    /// Default `Accept` header.
    pub accept: Option<&'static str>,
    /// Default `Content-Type` header, applied only when a body is sent.
    pub content_type: Option<&'static str>,
}

impl OperationSpec {
    /// Names of required parameters in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
    }

    fn has_body(&self) -> bool {
        self.params.iter().any(|param| {
            matches!(
                param.location,
                ParamLocation::Body | ParamLocation::BodyRoot
            )
        })
    }
}

/// Caller-supplied parameters for one operation call.
///
/// Values are keyed by the caller-facing parameter name. `null` counts as
/// absent. `headers` overrides any default header of the same name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    values: Map<String, JsonValue>,
    headers: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Sets a parameter only when `value` is `Some`.
    pub fn set_opt<V: Into<JsonValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(name, value),
            None => self,
        }
    }

    /// Adds a per-call header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns a present, non-null parameter value.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl From<Map<String, JsonValue>> for Params {
    fn from(values: Map<String, JsonValue>) -> Self {
        Self {
            values,
            headers: Vec::new(),
        }
    }
}

/// Builds the request descriptor for `operation` from caller `params`.
///
/// Required parameters are checked first; when any are missing the returned
/// error lists all of them and nothing else is evaluated.
pub fn build(operation: &OperationSpec, params: &Params) -> Result<RequestDescriptor> {
    let missing: Vec<&str> = operation
        .required()
        .filter(|name| params.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(VpcError::missing_parameters(missing));
    }

    let mut descriptor = RequestDescriptor::new(operation.method, operation.url_template);
    let mut body_fields = operation.has_body().then(Map::new);
    let mut header_params = Vec::new();

    for param in operation.params {
        let Some(value) = params.get(param.name) else {
            continue;
        };
        match param.location {
            ParamLocation::Path => {
                let value = scalar_to_string(param.name, value)?;
                descriptor
                    .path_params
                    .insert(param.wire_name.to_owned(), value);
            }
            ParamLocation::Query => {
                flatten_query(param.wire_name, value, &mut descriptor.query_params);
            }
            ParamLocation::Body => {
                if let Some(fields) = body_fields.as_mut() {
                    fields.insert(param.wire_name.to_owned(), value.clone());
                }
            }
            ParamLocation::BodyRoot => {
                descriptor.body = Some(value.clone());
                body_fields = None;
            }
            ParamLocation::Header => {
                header_params.push((param.wire_name, scalar_to_string(param.name, value)?));
            }
        }
    }

    if descriptor.body.is_none() {
        descriptor.body = body_fields.map(JsonValue::Object);
    }

    if let Some(accept) = operation.accept {
        descriptor
            .headers
            .insert(ACCEPT, header_value(ACCEPT.as_str(), accept)?);
    }
    if descriptor.body.is_some() {
        let content_type = operation.content_type.unwrap_or(JSON);
        descriptor
            .headers
            .insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), content_type)?);
    }
    for (name, value) in header_params {
        descriptor
            .headers
            .insert(header_name(name)?, header_value(name, &value)?);
    }
    merge_headers(&mut descriptor.headers, params.headers())?;

    Ok(descriptor)
}

/// Inserts `overrides` into `headers`, replacing any existing value per name.
pub(crate) fn merge_headers(headers: &mut HeaderMap, overrides: &[(String, String)]) -> Result<()> {
    for (name, value) in overrides {
        headers.insert(header_name(name)?, header_value(name, value)?);
    }
    Ok(())
}

/// Flattens `value` into query pairs under `prefix`.
///
/// Objects become dotted keys, arrays repeat the key, `null` leaves are
/// dropped.
pub fn flatten_query(prefix: &str, value: &JsonValue, out: &mut Vec<(String, QueryValue)>) {
    match value {
        JsonValue::Null => {}
        JsonValue::Bool(value) => out.push((prefix.to_owned(), QueryValue::Bool(*value))),
        JsonValue::Number(value) => out.push((prefix.to_owned(), QueryValue::Number(value.clone()))),
        JsonValue::String(value) => out.push((prefix.to_owned(), QueryValue::Text(value.clone()))),
        JsonValue::Array(items) => {
            for item in items {
                flatten_query(prefix, item, out);
            }
        }
        JsonValue::Object(fields) => {
            for (key, field) in fields {
                flatten_query(&format!("{prefix}.{key}"), field, out);
            }
        }
    }
}

fn scalar_to_string(name: &str, value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(value) => Ok(value.clone()),
        JsonValue::Number(value) => Ok(value.to_string()),
        JsonValue::Bool(value) => Ok(value.to_string()),
        _ => Err(VpcError::Validation(format!(
            "parameter '{name}' must be a string, number or boolean"
        ))),
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| VpcError::Validation(format!("invalid header name '{name}'")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| VpcError::Validation(format!("invalid value for header '{name}'")))
}
