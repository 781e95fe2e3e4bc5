//! Native `generateContent` provider implementation

use super::*;
use reqwest::Client;
use serde::Serialize;

const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";
const ENVELOPE: &str = "/candidates/0/content/parts/0/text";

/// Provider speaking the native wire format
pub struct NativeProvider {
    client: Client,
    config: ProviderConfig,
    host: String,
}

impl NativeProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        Ok(Self {
            client,
            config,
            host: DEFAULT_HOST.to_string(),
        })
    }

    /// Point the provider at another host (used against local test servers)
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.host, model)
    }
}

impl ModelProvider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Native
    }

    fn default_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    async fn send(&self, model: &str, request: &ModelRequest) -> Result<String> {
        let model = if model.is_empty() { self.default_model() } else { model };
        let body = build_request(request);

        let req = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body);

        dispatch(req, WireFormat::Native, model, ENVELOPE, "provider::native::send").await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NativeRequest {
    contents: Vec<NativeContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<NativeInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct NativeContent {
    role: &'static str,
    parts: Vec<NativePart>,
}

#[derive(Debug, Serialize)]
struct NativeInstruction {
    parts: Vec<NativePart>,
}

#[derive(Debug, Serialize)]
struct NativePart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

/// Build the native body for `request`
pub(crate) fn build_request(request: &ModelRequest) -> NativeRequest {
    let contents = request
        .turns
        .iter()
        .map(|turn| NativeContent {
            role: match turn.role {
                Role::User => "user",
                Role::Model => "model",
            },
            parts: vec![NativePart {
                text: turn.text.clone(),
            }],
        })
        .collect();

    let system_instruction = request.system.as_ref().map(|text| NativeInstruction {
        parts: vec![NativePart { text: text.clone() }],
    });

    let generation_config = match &request.contract {
        Some(contract) => GenerationConfig {
            response_mime_type: "application/json",
            response_schema: Some(contract.schema.clone()),
        },
        None => GenerationConfig {
            response_mime_type: "text/plain",
            response_schema: None,
        },
    };

    NativeRequest {
        contents,
        system_instruction,
        generation_config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::stub;
    use serde_json::json;

    fn contract() -> OutputContract {
        OutputContract {
            name: "Greeting",
            schema: json!({"type": "OBJECT", "properties": {"hello": {"type": "STRING"}}}),
        }
    }

    #[test]
    fn test_body_preserves_roles_and_system() {
        let request = ModelRequest::new(vec![Turn::user("draw a sun"), Turn::model("Sure!")])
            .with_system("You are Pixel, a friendly robot.");

        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "draw a sun"}]},
                    {"role": "model", "parts": [{"text": "Sure!"}]}
                ],
                "systemInstruction": {"parts": [{"text": "You are Pixel, a friendly robot."}]},
                "generationConfig": {"responseMimeType": "text/plain"}
            })
        );
    }

    #[test]
    fn test_body_attaches_schema() {
        let request = ModelRequest::new(vec![Turn::user("hi")]).with_contract(contract());
        let body = serde_json::to_value(build_request(&request)).unwrap();

        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[tokio::test]
    async fn test_send_reads_candidate_text() {
        let reply = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"hello\":\"world\"}"}]}}]}"#;
        let (host, server) = stub::serve_once(200, reply).await;

        let provider = NativeProvider::new(ProviderConfig::new("secret-key"))
            .unwrap()
            .with_host(host);
        let request = ModelRequest::new(vec![Turn::user("hi")]).with_contract(contract());

        let text = provider.send("", &request).await.unwrap();
        assert_eq!(text, r#"{"hello":"world"}"#);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent?key=secret-key"));
        assert!(raw.contains("\"responseMimeType\":\"application/json\""));
    }

    #[tokio::test]
    async fn test_send_maps_service_error() {
        let (host, server) = stub::serve_once(503, r#"{"error":"overloaded"}"#).await;
        let provider = NativeProvider::new(ProviderConfig::new("k")).unwrap().with_host(host);

        let err = provider
            .send("gemini-2.5-flash", &ModelRequest::new(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceFailed);
        assert_eq!(err.context_value("status"), Some("503"));
        assert_eq!(err.context_value("body"), Some(r#"{"error":"overloaded"}"#));
        assert!(err.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_maps_missing_candidates() {
        let (host, server) = stub::serve_once(200, r#"{"candidates":[]}"#).await;
        let provider = NativeProvider::new(ProviderConfig::new("k")).unwrap().with_host(host);

        let err = provider
            .send("", &ModelRequest::new(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_maps_transport_failure() {
        let host = stub::closed_address().await;
        let provider = NativeProvider::new(ProviderConfig::new("k")).unwrap().with_host(host);

        let err = provider
            .send("", &ModelRequest::new(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkFailed);
        assert_eq!(err.operation(), "provider::native::send");
    }
}
