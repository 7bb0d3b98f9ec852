//! HTTP implementation of [`ApiClient`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use pylon_core::{ApiClient, ApiError, ApiResult};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Calls the Web API over HTTPS.
///
/// Every method is sent as a JSON `POST` to `{api_url}{method}`; a body with
/// `ok: false` is turned into [`ApiError::Platform`].
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    api_url: String,
}

impl HttpApiClient {
    /// Creates a client for `api_url` with the given request timeout.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> RuntimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Client(e.to_string()))?;

        let mut api_url = api_url.into();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        Ok(Self { http, api_url })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}", self.api_url, method.trim_start_matches('/'))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(&self, method: &str, token: Option<&str>, params: Value) -> ApiResult<Value> {
        let url = self.method_url(method);
        trace!(method, "calling Web API");

        let mut request = self.http.post(&url).json(&params);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(method, status = %status, "Web API call returned an error status");
            return Err(ApiError::Transport(format!("HTTP {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::Serialization(e.to_string()))?;

        check_ok(method, body)
    }

    async fn post_response_url(&self, url: &str, body: Value) -> ApiResult<()> {
        debug!("posting to response_url");

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Transport(format!("HTTP {status}")));
        }
        Ok(())
    }
}

/// Maps the platform's `{ "ok": false, "error": ... }` convention onto [`ApiError`].
fn check_ok(method: &str, body: Value) -> ApiResult<Value> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(ApiError::Platform {
            method: method.to_string(),
            error,
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_url_joins_base() {
        let client = HttpApiClient::new("https://example.test/api", Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_url(), "https://example.test/api/");
        assert_eq!(
            client.method_url("chat.postMessage"),
            "https://example.test/api/chat.postMessage"
        );
    }

    #[test]
    fn ok_false_is_a_platform_error() {
        let err = check_ok("chat.postMessage", json!({ "ok": false, "error": "channel_not_found" }))
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Platform { ref method, ref error }
                if method == "chat.postMessage" && error == "channel_not_found"
        ));
    }

    #[test]
    fn ok_true_passes_body_through() {
        let body = json!({ "ok": true, "ts": "1.2" });
        assert_eq!(check_ok("chat.postMessage", body.clone()).unwrap(), body);
    }
}
