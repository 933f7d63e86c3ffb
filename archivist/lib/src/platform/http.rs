//! Retry-wrapped HTTP requests shared by both platform clients.

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::warn;

use crate::error::ArchiveError;

/// Fixed retry bound; retries are immediate, with no backoff.
pub(crate) const DEFAULT_ATTEMPTS: u32 = 3;

/// Send `method url`, retrying transport failures and non-2xx responses
/// up to `attempts` times. A 404 is logged specially but still retried;
/// on the terminal attempt the underlying error propagates.
pub(crate) async fn request_with_retry(
    client: &Client,
    method: Method,
    url: &str,
    query: Option<&[(&str, String)]>,
    json_body: Option<&Value>,
    attempts: u32,
) -> Result<Response, ArchiveError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut request = client.request(method.clone(), url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let error = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if status == StatusCode::NOT_FOUND {
                    warn!(url, "resource not found (404)");
                }
                let body = response.text().await.unwrap_or_default();
                ArchiveError::ApiStatus {
                    status: status.as_u16(),
                    body,
                }
            }
            Err(transport) => ArchiveError::Http(transport),
        };

        if attempt >= attempts {
            return Err(error);
        }
        warn!(attempt, url, error = %error, "request failed, retrying");
    }
}
