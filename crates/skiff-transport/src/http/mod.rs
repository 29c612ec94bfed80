//! HTTP transport for the bot API.
//!
//! Every API method is a `GET {api_url}/{method}` with the bot token and the
//! method parameters in the query string. Replies are JSON objects; a reply
//! with `"ok": false` carries a `description` of what went wrong.

#[cfg(feature = "http-client")]
mod client;

#[cfg(feature = "http-client")]
pub use client::{HttpConfig, HttpTransport};

use serde_json::Value;
use skiff_core::{TransportError, TransportResult};

/// Maps an HTTP status and body to the decoded reply or a [`TransportError`].
///
/// - 401 and 403 are credential errors.
/// - `"ok": false` is a credential error when its description mentions the
///   token, and an [`TransportError::Api`] error otherwise.
/// - Any other non-2xx status is an API error.
/// - A 2xx body that is not JSON is a decode error.
pub fn classify_response(status: u16, body: &str) -> TransportResult<Value> {
    if status == 401 || status == 403 {
        return Err(TransportError::invalid_credential(describe(body)));
    }

    let success = (200..300).contains(&status);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if !success => {
            return Err(TransportError::Api {
                status,
                description: describe(body),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if value.get("ok").and_then(Value::as_bool) == Some(false) {
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        if description.to_lowercase().contains("token") {
            return Err(TransportError::invalid_credential(description));
        }
        return Err(TransportError::Api {
            status,
            description,
        });
    }

    if !success {
        return Err(TransportError::Api {
            status,
            description: describe(body),
        });
    }

    Ok(value)
}

/// Short, single-line excerpt of a response body for error messages.
fn describe(body: &str) -> String {
    const LIMIT: usize = 200;
    let line = body.lines().next().unwrap_or("").trim();
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None if line.is_empty() => "empty response".to_string(),
        None => line.to_string(),
    }
}

/// Formats the User-Agent sent with every request:
/// `{name}/{version} (uin={uin}) skiff/{crate version}`.
///
/// `uin` is the part of the token after its last `:`; tokens without a
/// colon report an empty uin.
pub fn user_agent(token: &str, name: Option<&str>, version: Option<&str>) -> String {
    let uin = token.rsplit_once(':').map(|(_, uin)| uin).unwrap_or("");
    format!(
        "{}/{} (uin={}) skiff/{}",
        name.unwrap_or("skiff-bot"),
        version.unwrap_or(env!("CARGO_PKG_VERSION")),
        uin,
        env!("CARGO_PKG_VERSION"),
    )
}

/// Joins the API base URL and a method path with exactly one `/`.
#[cfg_attr(not(feature = "http-client"), allow(dead_code))]
pub(crate) fn endpoint(api_url: &str, method: &str) -> String {
    format!(
        "{}/{}",
        api_url.trim_end_matches('/'),
        method.trim_start_matches('/')
    )
}
