use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio::time::sleep;

use crate::transport::{HttpRequest, Transport};
use crate::{
    Authenticator, DetailedResponse, RequestDescriptor, Result, SharedRetryPolicy, VpcError,
};

/// Executes one logical call: authenticate, send, classify, retry.
///
/// Holds no state between calls. The retry policy is re-read after every
/// failed attempt.
#[derive(Clone, Copy, Debug)]
pub struct Dispatcher<'a> {
    transport: &'a dyn Transport,
    service_url: &'a str,
}

struct Failure {
    error: VpcError,
    retry_after: Option<Duration>,
}

impl From<VpcError> for Failure {
    fn from(error: VpcError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: &'a dyn Transport, service_url: &'a str) -> Self {
        Self {
            transport,
            service_url,
        }
    }

    /// Sends `descriptor` until it succeeds, fails permanently or the retry
    /// policy gives up. Every attempt authenticates the original descriptor.
    pub async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        authenticator: &dyn Authenticator,
        retry: &SharedRetryPolicy,
    ) -> Result<DetailedResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self.attempt(descriptor, authenticator, attempt).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            let policy = retry.get();
            if !policy.should_retry(attempt, &failure.error) {
                return Err(failure.error);
            }

            let delay = policy.backoff_delay(attempt, failure.retry_after);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure.error,
                "retrying request"
            );

            sleep(delay).await;

            // The toggle may have flipped while sleeping.
            if !retry.get().should_retry(attempt, &failure.error) {
                return Err(failure.error);
            }
        }
    }

    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        authenticator: &dyn Authenticator,
        _attempt: u32,
    ) -> std::result::Result<DetailedResponse, Failure> {
        let authenticated = authenticator.authenticate(descriptor).await?;
        let request = self.render(authenticated)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = _attempt,
            "sending request"
        );

        let response = self.transport.send(request).await?;
        if !(200..300).contains(&response.status) {
            return Err(Failure {
                retry_after: retry_after(&response.headers),
                error: VpcError::from_response(response.status, &response.body),
            });
        }
        Ok(DetailedResponse::from_http(response)?)
    }

    fn render(&self, descriptor: RequestDescriptor) -> Result<HttpRequest> {
        let url = descriptor.url(self.service_url)?;
        let body = descriptor
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| VpcError::Validation(format!("request body is not serializable: {err}")))?;

        Ok(HttpRequest {
            method: descriptor.method,
            url,
            headers: descriptor.headers,
            body,
        })
    }
}

/// Parses a delay-seconds `Retry-After` header. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
