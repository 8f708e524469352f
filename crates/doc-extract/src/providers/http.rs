//! Shared HTTP plumbing for service clients

use std::time::Duration;

use crate::error::{Error, Result};

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Build a client with a per-request timeout
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure onto the pipeline's error kinds
pub fn send_error(service: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            service: service.to_string(),
            message: err.to_string(),
        }
    } else {
        Error::Connectivity {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

/// Pass 2xx responses through; turn everything else into an error
///
/// 429 becomes [`Error::RateLimited`], the retryable signal.
pub async fn check_status(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited {
            service: service.to_string(),
        });
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }

    Err(Error::ServiceStatus {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Decode a JSON body, reporting malformed payloads as schema violations
pub async fn read_json<T: serde::de::DeserializeOwned>(
    service: &str,
    response: reqwest::Response,
) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| send_error(service, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::schema_violation(format!("{} returned malformed JSON: {}", service, e))
    })
}
