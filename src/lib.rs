//! `vpc-client` is the request runtime behind the VPC infrastructure REST API.
//!
//! Every API operation is described as data ([`OperationSpec`]) and executed
//! through one path:
//! - [`VpcClient::invoke`] validates parameters and builds a [`RequestDescriptor`]
//! - an [`Authenticator`] decorates it
//! - the dispatcher sends it, retrying transient failures when
//!   [`VpcClient::enable_retries`] is on
//!
//! All failures surface as [`VpcError`].

mod auth;
pub mod catalog;
pub mod config;
mod client;
mod descriptor;
mod dispatch;
mod error;
pub mod operation;
mod options;
mod retry;
mod token;
pub mod transport;
mod types;

pub use auth::{
    authenticator_from_properties, resolve_authenticator, ApiKeyAuthenticator, AuthType,
    Authenticator, BasicAuthenticator, BearerTokenAuthenticator, ContainerAuthenticator,
    ContainerOptions, CredentialDiscovery, EnvironmentDiscovery, IamAuthenticator,
    NoAuthAuthenticator, DEFAULT_APIKEY_HEADER,
};
pub use client::VpcClient;
pub use config::Environment;
pub use descriptor::{placeholders, Method, QueryValue, RequestDescriptor};
pub use dispatch::Dispatcher;
pub use error::VpcError;
pub use operation::{OperationSpec, ParamLocation, ParamSpec, Params};
pub use options::{ClientOptions, ServiceOptions, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_URL};
pub use retry::{Backoff, RetryOptions, RetryPolicy, SharedRetryPolicy};
pub use token::{TokenServiceOptions, DEFAULT_AUTH_URL, DEFAULT_CR_TOKEN_FILENAME};
pub use transport::Transport;
pub use types::DetailedResponse;

pub type Result<T> = std::result::Result<T, VpcError>;
