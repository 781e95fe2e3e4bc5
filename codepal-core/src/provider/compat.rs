//! OpenAI-compatible `chat/completions` provider implementation
//!
//! Works with any server exposing the chat-completions shape (vLLM, Ollama,
//! hosted gateways). Structured-output requests are downgraded to the generic
//! JSON object mode because the schema cannot be carried.

use super::*;
use reqwest::Client;
use serde::Serialize;

const ENVELOPE: &str = "/choices/0/message/content";

/// Clause added to the system text so JSON mode is accepted by the server
pub const JSON_REMINDER: &str = "Respond with a single valid JSON object.";

/// Provider speaking the compatibility wire format
pub struct CompatProvider {
    client: Client,
    config: ProviderConfig,
}

impl CompatProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.base_url.is_none() {
            return Err(Error::config_missing(ENV_BASE_URL).with_operation("provider::compat::new"));
        }
        let client = build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('/')
    }
}

impl ModelProvider for CompatProvider {
    fn name(&self) -> &str {
        "compat"
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Compat
    }

    fn default_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    async fn send(&self, model: &str, request: &ModelRequest) -> Result<String> {
        let model = if model.is_empty() { self.default_model() } else { model };
        let body = build_request(model, request);

        let req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body);

        dispatch(req, WireFormat::Compat, model, ENVELOPE, "provider::compat::send").await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CompatRequest {
    model: String,
    messages: Vec<CompatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct CompatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

/// Build the compatibility body for `request`
pub(crate) fn build_request(model: &str, request: &ModelRequest) -> CompatRequest {
    let wants_json = request.contract.is_some();

    let system = match (&request.system, wants_json) {
        (Some(text), true) if !text.to_lowercase().contains("json") => {
            Some(format!("{} {}", text.trim_end(), JSON_REMINDER))
        }
        (Some(text), _) => Some(text.clone()),
        (None, true) => Some(JSON_REMINDER.to_string()),
        (None, false) => None,
    };

    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(content) = system {
        messages.push(CompatMessage {
            role: "system",
            content,
        });
    }
    messages.extend(request.turns.iter().map(|turn| CompatMessage {
        role: match turn.role {
            Role::User => "user",
            Role::Model => "assistant",
        },
        content: turn.text.clone(),
    }));

    CompatRequest {
        model: model.to_string(),
        messages,
        response_format: wants_json.then_some(ResponseFormat {
            r#type: "json_object",
        }),
    }
}
