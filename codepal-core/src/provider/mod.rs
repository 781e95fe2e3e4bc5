//! # Model Provider Interface
//!
//! One send/receive contract over two hosted-model wire formats.
//!
//! ## Design
//! - `ModelProvider` trait defines the core interface
//! - `NativeProvider` speaks the native `generateContent` format
//! - `CompatProvider` speaks the OpenAI-compatible `chat/completions` format
//! - `ModelAdapter` picks one of them from `ProviderConfig`: an alternate
//!   base address selects the compatibility format, otherwise native
//! - Wire bodies are built by pure functions; only `send` touches the network
//! - No retries here: retry policy belongs to the caller

pub mod compat;
pub mod native;

pub use compat::CompatProvider;
pub use native::NativeProvider;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when neither the config nor the request names one
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Per-request timeout when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_API_KEY: &str = "CODEPAL_API_KEY";
pub const ENV_BASE_URL: &str = "CODEPAL_BASE_URL";
pub const ENV_MODEL: &str = "CODEPAL_MODEL";
pub const ENV_TIMEOUT: &str = "CODEPAL_TIMEOUT_SECS";

// ============================================================================
// Core Types
// ============================================================================

/// Who said a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of the conversation sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Descriptor of the structured shape a reply must have.
///
/// `schema` uses the OpenAPI subset understood by the native format. The
/// compatibility format cannot carry it and falls back to a generic JSON mode.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContract {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

/// A request in the adapter's internal shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRequest {
    pub turns: Vec<Turn>,
    pub system: Option<String>,
    pub contract: Option<OutputContract>,
}

impl ModelRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_contract(mut self, contract: OutputContract) -> Self {
        self.contract = Some(contract);
        self
    }
}

/// Which wire protocol a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Native,
    Compat,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Native => "native",
            WireFormat::Compat => "compat",
        }
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The model provider trait
#[allow(async_fn_in_trait)]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the wire format this provider speaks
    fn wire_format(&self) -> WireFormat;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a request and return the reply's payload text.
    ///
    /// An empty `model` falls back to [`ModelProvider::default_model`].
    async fn send(&self, model: &str, request: &ModelRequest) -> Result<String>;
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, treating blank values as unset.
    ///
    /// A missing credential is a `ConfigMissing` error; a malformed base
    /// address or timeout is `ConfigInvalid`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(ENV_API_KEY)
            .ok_or_else(|| Error::config_missing(ENV_API_KEY).with_operation("config::from_env"))?;

        let mut config = Self::new(api_key);

        if let Some(base_url) = get(ENV_BASE_URL) {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(Error::config_invalid(
                    ENV_BASE_URL,
                    format!("'{}' is not an http(s) address", base_url),
                )
                .with_operation("config::from_env"));
            }
            config.base_url = Some(base_url);
        }

        config.model = get(ENV_MODEL);

        if let Some(raw) = get(ENV_TIMEOUT) {
            let secs = raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                Error::config_invalid(ENV_TIMEOUT, format!("'{}' is not a positive number", raw))
                    .with_operation("config::from_env")
            })?;
            config.timeout_secs = secs;
        }

        Ok(config)
    }

    /// The wire format this configuration selects
    pub fn wire_format(&self) -> WireFormat {
        if self.base_url.is_some() {
            WireFormat::Compat
        } else {
            WireFormat::Native
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// The provider chosen by configuration
pub enum ModelAdapter {
    Native(NativeProvider),
    Compat(CompatProvider),
}

impl ModelAdapter {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        let adapter = match config.wire_format() {
            WireFormat::Native => ModelAdapter::Native(NativeProvider::new(config)?),
            WireFormat::Compat => ModelAdapter::Compat(CompatProvider::new(config)?),
        };
        info!(
            target: "codepal::provider",
            wire = adapter.wire_format().as_str(),
            model = adapter.default_model(),
            "model adapter ready"
        );
        Ok(adapter)
    }
}

impl ModelProvider for ModelAdapter {
    fn name(&self) -> &str {
        match self {
            ModelAdapter::Native(p) => p.name(),
            ModelAdapter::Compat(p) => p.name(),
        }
    }

    fn wire_format(&self) -> WireFormat {
        match self {
            ModelAdapter::Native(p) => p.wire_format(),
            ModelAdapter::Compat(p) => p.wire_format(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            ModelAdapter::Native(p) => p.default_model(),
            ModelAdapter::Compat(p) => p.default_model(),
        }
    }

    async fn send(&self, model: &str, request: &ModelRequest) -> Result<String> {
        match self {
            ModelAdapter::Native(p) => p.send(model, request).await,
            ModelAdapter::Compat(p) => p.send(model, request).await,
        }
    }
}

// ============================================================================
// Shared HTTP plumbing
// ============================================================================

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| {
            Error::unexpected("failed to create HTTP client")
                .with_operation("provider::build_client")
                .set_source(e)
        })
}

/// Send `request`, check the status, and pull the payload text found at
/// `envelope` (a JSON pointer) out of the reply body.
pub(crate) async fn dispatch(
    request: reqwest::RequestBuilder,
    format: WireFormat,
    model: &str,
    envelope: &str,
    operation: &'static str,
) -> Result<String> {
    let started = Instant::now();

    let response = request.send().await.map_err(|e| {
        // The native credential travels in the query string
        let e = e.without_url();
        warn!(target: "codepal::provider", wire = format.as_str(), %model, error = %e, "transport failure");
        Error::network_failed(e.to_string())
            .with_operation(operation)
            .with_context("model", model)
            .set_source(e)
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        let e = e.without_url();
        Error::network_failed(format!("failed to read response body: {}", e))
            .with_operation(operation)
            .with_context("model", model)
            .set_source(e)
    })?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if !status.is_success() {
        warn!(
            target: "codepal::provider",
            wire = format.as_str(),
            %model,
            status = status.as_u16(),
            elapsed_ms,
            body_bytes = body.len(),
            "service answered with an error"
        );
        return Err(Error::service_failed(status.as_u16(), body)
            .with_operation(operation)
            .with_context("model", model));
    }

    let text = extract_text(&body, envelope).map_err(|e| {
        e.with_operation(operation).with_context("model", model)
    })?;

    info!(
        target: "codepal::provider",
        wire = format.as_str(),
        %model,
        status = status.as_u16(),
        elapsed_ms,
        body_bytes = body.len(),
        text_bytes = text.len(),
        "model call ok"
    );
    Ok(text)
}

/// Read the payload text at `pointer` from a reply body.
///
/// Anything short of a non-blank string there (including a body that is not
/// JSON) is an `EmptyResponse`.
pub(crate) fn extract_text(body: &str, pointer: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        debug!(target: "codepal::provider", error = %e, "reply body is not JSON");
        Error::empty_response("reply body is not a JSON envelope").set_source(e)
    })?;

    match value.pointer(pointer).and_then(|v| v.as_str()) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => Err(Error::empty_response("reply carried blank text")
            .with_context("envelope", pointer)),
        None => Err(Error::empty_response("reply lacks the expected envelope field")
            .with_context("envelope", pointer)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod stub {
    //! A one-shot HTTP responder on a local socket.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one request with `status` and `body`. The join handle
    /// yields the raw request text as received.
    pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    if buf.len() >= end + 4 + content_length(&head) {
                        break;
                    }
                }
            }

            let reason = if status < 400 { "OK" } else { "Error" };
            let reply = format!(
                "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    /// An address nothing listens on
    pub async fn closed_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_turn_constructors() {
        let user = Turn::user("draw a cat");
        assert_eq!(user.role, Role::User);

        let model = Turn::model("Meow!");
        assert_eq!(model.role, Role::Model);
        assert_eq!(model.text, "Meow!");
    }

    #[test]
    fn test_request_builder() {
        let request = ModelRequest::new(vec![Turn::user("hi")])
            .with_system("be kind")
            .with_contract(OutputContract {
                name: "Anything",
                schema: serde_json::json!({"type": "OBJECT"}),
            });

        assert_eq!(request.system.as_deref(), Some("be kind"));
        assert_eq!(request.contract.as_ref().map(|c| c.name), Some("Anything"));
    }

    #[test]
    fn test_config_requires_credential() {
        let err = ProviderConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert_eq!(err.context_value("setting"), Some(ENV_API_KEY));

        let err = ProviderConfig::from_lookup(lookup(&[(ENV_API_KEY, "   ")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    }

    #[test]
    fn test_config_selects_wire_format() {
        let config = ProviderConfig::from_lookup(lookup(&[(ENV_API_KEY, "k")])).unwrap();
        assert_eq!(config.wire_format(), WireFormat::Native);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let config = ProviderConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_BASE_URL, "https://llm.example.com/v1"),
            (ENV_MODEL, "tiny-model"),
            (ENV_TIMEOUT, "15"),
        ]))
        .unwrap();
        assert_eq!(config.wire_format(), WireFormat::Compat);
        assert_eq!(config.model.as_deref(), Some("tiny-model"));
        assert_eq!(config.timeout_secs, 15);

        // Blank base address means "not configured"
        let config =
            ProviderConfig::from_lookup(lookup(&[(ENV_API_KEY, "k"), (ENV_BASE_URL, "")])).unwrap();
        assert_eq!(config.wire_format(), WireFormat::Native);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = ProviderConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_BASE_URL, "llm.example.com"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err =
            ProviderConfig::from_lookup(lookup(&[(ENV_API_KEY, "k"), (ENV_TIMEOUT, "soon")]))
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = ProviderConfig::new("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_adapter_follows_config() {
        let adapter = ModelAdapter::from_config(ProviderConfig::new("k")).unwrap();
        assert_eq!(adapter.wire_format(), WireFormat::Native);
        assert_eq!(adapter.default_model(), DEFAULT_MODEL);

        let adapter = ModelAdapter::from_config(
            ProviderConfig::new("k")
                .with_base_url("http://localhost:8080/v1")
                .with_model("local-llm"),
        )
        .unwrap();
        assert_eq!(adapter.wire_format(), WireFormat::Compat);
        assert_eq!(adapter.default_model(), "local-llm");
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        assert_eq!(extract_text(body, "/choices/0/message/content").unwrap(), "hello");

        let err = extract_text(r#"{"choices":[]}"#, "/choices/0/message/content").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);

        let err = extract_text(r#"{"choices":[{"message":{"content":"  "}}]}"#, "/choices/0/message/content")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);

        let err = extract_text("<html>gateway</html>", "/choices/0/message/content").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);
    }
}
