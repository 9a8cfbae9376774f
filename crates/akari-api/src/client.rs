// Device control-plane HTTP client
//
// Wraps `reqwest::Client` with per-device URL construction, API key
// injection, the single transient retry, and status-to-error mapping.
// Endpoint methods live in sibling modules (health, sections, system) as
// inherent impls so this file stays focused on transport mechanics.

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::device::DeviceIdentity;
use crate::error::{Error, preview};
use crate::models::Ack;
use crate::transport::{ApiKeyHeader, TransportConfig};

/// Typed client for the HTTP control plane exposed by each device.
///
/// One instance serves the whole fleet: every call names the
/// [`DeviceIdentity`] it targets. Cheap to share behind an `Arc`.
pub struct RemoteConfigClient {
    http: reqwest::Client,
    config: TransportConfig,
}

impl RemoteConfigClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self { http, config })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The client's own timeout is used as-is; `config.timeout` is only
    /// reported in errors.
    pub fn with_client(http: reqwest::Client, config: TransportConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET `path` and decode the body as `T`.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        device: &DeviceIdentity,
        path: &str,
    ) -> Result<T, Error> {
        let body = self.execute(device, Method::GET, path, None).await?;
        serde_json::from_str(&body).map_err(|e| Error::malformed(e, &body))
    }

    /// GET `path` and require a JSON object body.
    pub(crate) async fn get_object(
        &self,
        device: &DeviceIdentity,
        path: &str,
    ) -> Result<Map<String, Value>, Error> {
        let body = self.execute(device, Method::GET, path, None).await?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::malformed(
                format!("expected a JSON object, got {}", json_kind(&other)),
                &body,
            )),
            Err(e) => Err(Error::malformed(e, &body)),
        }
    }

    /// Send a mutating request and decode the acknowledgement.
    pub(crate) async fn send_ack(
        &self,
        device: &DeviceIdentity,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> Result<Ack, Error> {
        let text = self.execute(device, method, path, body).await?;
        parse_ack(&text)
    }

    /// Run one logical call: up to `1 + retry.max_retries` attempts, retrying
    /// only connect, timeout, and reset failures, then map the final answer.
    async fn execute(
        &self,
        device: &DeviceIdentity,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> Result<String, Error> {
        let url = device.base_url()?.join(path)?;
        let mut retries = 0;

        loop {
            debug!(device_id = %device.device_id, %method, %url, retries, "sending request");

            match self.attempt(device, method.clone(), url.clone(), body).await {
                Ok((status, text)) => return map_status(status, text),
                Err(e) if is_transient(&e) && retries < self.config.retry.max_retries => {
                    retries += 1;
                    warn!(
                        device_id = %device.device_id,
                        %url,
                        error = %error_chain(&e),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
                Err(e) if is_transient(&e) => {
                    return Err(Error::Unreachable {
                        url: url.to_string(),
                        reason: error_chain(&e),
                        timed_out: e.is_timeout(),
                    });
                }
                Err(e) => return Err(Error::Transport(error_chain(&e))),
            }
        }
    }

    /// A single attempt. Reading the body is part of the attempt so a reset
    /// mid-body counts as a transport failure.
    async fn attempt(
        &self,
        device: &DeviceIdentity,
        method: Method,
        url: Url,
        body: Option<&Map<String, Value>>,
    ) -> Result<(StatusCode, String), reqwest::Error> {
        let mut builder = self.apply_api_key(self.http.request(method, url), device);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        Ok((status, text))
    }

    fn apply_api_key(&self, builder: RequestBuilder, device: &DeviceIdentity) -> RequestBuilder {
        let Some(key) = device
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.is_empty())
        else {
            return builder;
        };

        match self.config.api_key_header {
            ApiKeyHeader::Bearer => builder.bearer_auth(key),
            ApiKeyHeader::XApiKey => builder.header("X-API-Key", key),
        }
    }
}

// ── Response mapping ────────────────────────────────────────────────

/// Connect failures, timeouts, and connections dropped mid-exchange.
/// Anything else reqwest reports while sending (a response that is not
/// HTTP, a TLS or protocol error) is a hard transport failure.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_body() || (e.is_request() && is_connection_reset(e))
}

fn is_connection_reset(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = e.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        source = cause.source();
    }
    false
}

/// Render an error with its source chain; reqwest's top-level message
/// alone rarely says *why* ("error sending request for url ...").
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn map_status(status: StatusCode, body: String) -> Result<String, Error> {
    if status.is_success() {
        return Ok(body);
    }

    let code = status.as_u16();
    let message = remote_message(status, &body);

    Err(match code {
        401 | 403 => Error::Unauthorized { status: code },
        500..=599 => Error::RemoteFault {
            status: code,
            message,
        },
        _ => Error::RemoteRejected {
            status: code,
            message,
        },
    })
}

/// Best human-readable reason from an error body: `error`, `detail` or
/// `message` fields if the body is JSON, else the raw text, else the
/// canonical status reason.
fn remote_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_owned()
    } else {
        preview(trimmed).to_owned()
    }
}

fn parse_ack(body: &str) -> Result<Ack, Error> {
    if body.trim().is_empty() {
        return Ok(Ack::default());
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Null) => Ok(Ack::default()),
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(|e| Error::malformed(e, body))
        }
        Ok(other) => Err(Error::malformed(
            format!("expected a JSON object, got {}", json_kind(&other)),
            body,
        )),
        Err(e) => Err(Error::malformed(e, body)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
