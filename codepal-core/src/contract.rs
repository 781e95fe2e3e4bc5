//! Structured reply contracts
//!
//! Model replies are loosely typed text. Every structured reply is decoded at
//! this boundary and validated exhaustively; anything that does not fit fails
//! with `DecodeFailed`.

use crate::canvas::DrawingCommand;
use crate::error::{Error, Result};
use crate::provider::OutputContract;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A structured reply shape the model can be asked for
pub trait Contract: DeserializeOwned + Sized {
    const NAME: &'static str;

    /// Schema descriptor sent with native-format requests
    fn output_contract() -> OutputContract;

    /// Check invariants serde cannot express. May normalize fields.
    fn validate(self) -> std::result::Result<Self, String>;
}

/// Decode model text into contract `T`.
///
/// Markdown code fences around the payload are tolerated. The text is tried
/// as-is first, so fences inside string values are left alone.
pub fn decode<T: Contract>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    let parsed = serde_json::from_str::<T>(trimmed).or_else(|e| {
        let payload = strip_fences(trimmed);
        if payload == trimmed {
            Err(e)
        } else {
            serde_json::from_str::<T>(payload)
        }
    });

    let value = parsed.map_err(|e| {
        Error::decode_failed(T::NAME, format!("payload does not match contract: {}", e))
            .with_operation("contract::decode")
            .set_source(e)
    })?;

    value.validate().map_err(|reason| {
        Error::decode_failed(T::NAME, reason).with_operation("contract::decode")
    })
}

/// Unwrap the outermost Markdown fenced block if present
///
/// Text before the opening fence and after the last closing fence is dropped,
/// together with an info string such as `json`.
pub fn strip_fences(content: &str) -> &str {
    let content = content.trim();
    let Some(start) = content.find("```") else {
        return content;
    };
    let rest = &content[start + 3..];
    let body = match rest.split_once('\n') {
        Some((info, body)) if info.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => rest,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ============================================================================
// TutorJudgement
// ============================================================================

/// The tutor's verdict on one user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorJudgement {
    pub message: String,
    pub step_complete: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub visual_action: Option<String>,
    #[serde(default)]
    pub correction: Option<String>,
}

impl Contract for TutorJudgement {
    const NAME: &'static str = "TutorJudgement";

    fn output_contract() -> OutputContract {
        OutputContract {
            name: Self::NAME,
            schema: json!({
                "type": "OBJECT",
                "properties": {
                    "message": {
                        "type": "STRING",
                        "description": "Friendly reply to the child, one or two short sentences."
                    },
                    "stepComplete": {
                        "type": "BOOLEAN",
                        "description": "True when the request satisfies the current step."
                    },
                    "code": {
                        "type": "STRING",
                        "description": "Code lines to add to the editor when the step is complete."
                    },
                    "visualAction": {
                        "type": "STRING",
                        "description": "Key of the visual action the code performs."
                    },
                    "correction": {
                        "type": "STRING",
                        "description": "Gentle nudge when the request misses the step."
                    }
                },
                "required": ["message", "stepComplete"]
            }),
        }
    }

    fn validate(mut self) -> std::result::Result<Self, String> {
        if self.message.trim().is_empty() {
            return Err("message must not be blank".into());
        }
        self.code = non_blank(self.code);
        self.visual_action = non_blank(self.visual_action);
        self.correction = non_blank(self.correction);
        Ok(self)
    }
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// Outcome of a simulated run of the code buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub console_output: String,
    pub is_success: bool,
    pub is_objective_met: bool,
    #[serde(default)]
    pub drawing_commands: Vec<DrawingCommand>,
}

impl Contract for ExecutionResult {
    const NAME: &'static str = "ExecutionResult";

    fn output_contract() -> OutputContract {
        let number = json!({"type": "NUMBER"});
        OutputContract {
            name: Self::NAME,
            schema: json!({
                "type": "OBJECT",
                "properties": {
                    "consoleOutput": {
                        "type": "STRING",
                        "description": "What the program prints, or the error it raises."
                    },
                    "isSuccess": {
                        "type": "BOOLEAN",
                        "description": "False when the code would fail to run."
                    },
                    "isObjectiveMet": {
                        "type": "BOOLEAN",
                        "description": "True when running the code achieves the current step."
                    },
                    "drawingCommands": {
                        "type": "ARRAY",
                        "description": "The complete picture on screen after the run.",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "type": {
                                    "type": "STRING",
                                    "enum": ["fill", "circle", "rect", "text", "clear"]
                                },
                                "x": number,
                                "y": number,
                                "radius": number,
                                "width": number,
                                "height": number,
                                "color": {"type": "STRING"},
                                "text": {"type": "STRING"}
                            },
                            "required": ["type"]
                        }
                    }
                },
                "required": ["consoleOutput", "isSuccess", "isObjectiveMet", "drawingCommands"]
            }),
        }
    }

    fn validate(self) -> std::result::Result<Self, String> {
        for (i, command) in self.drawing_commands.iter().enumerate() {
            command
                .validate()
                .map_err(|reason| format!("drawingCommands[{}]: {}", i, reason))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_judgement_decodes() {
        let judgement: TutorJudgement = decode(
            r#"{"message":"Nice!","stepComplete":true,"code":"screen.fill(\"black\")","visualAction":"fill_screen"}"#,
        )
        .unwrap();

        assert!(judgement.step_complete);
        assert_eq!(judgement.code.as_deref(), Some("screen.fill(\"black\")"));
        assert_eq!(judgement.visual_action.as_deref(), Some("fill_screen"));
        assert_eq!(judgement.correction, None);
    }

    #[test]
    fn test_judgement_blank_optionals_are_absent() {
        let judgement: TutorJudgement =
            decode(r#"{"message":"Try again","stepComplete":false,"code":"  ","correction":""}"#)
                .unwrap();
        assert_eq!(judgement.code, None);
        assert_eq!(judgement.correction, None);
    }

    #[test]
    fn test_judgement_rejects_blank_message() {
        let err = decode::<TutorJudgement>(r#"{"message":"  ","stepComplete":true}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
        assert_eq!(err.context_value("contract"), Some("TutorJudgement"));
    }

    #[test]
    fn test_judgement_rejects_missing_flag() {
        let err = decode::<TutorJudgement>(r#"{"message":"hi"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);

        let err = decode::<TutorJudgement>("Sure! Here is your code.").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }

    #[test]
    fn test_fenced_payload() {
        let text = "Here you go:\n```json\n{\"message\":\"ok\",\"stepComplete\":false}\n```\n";
        let judgement: TutorJudgement = decode(text).unwrap();
        assert_eq!(judgement.message, "ok");

        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {} "), "{}");
        assert_eq!(strip_fences("```json\n{\"a\":\"```x```\"}\n```\nbye"), "{\"a\":\"```x```\"}");
    }

    #[test]
    fn test_fences_inside_message_are_kept() {
        let text = r#"{"message":"Here you go:\n```\nscreen.fill(\"black\")\n```","stepComplete":true,"code":"screen.fill(\"black\")"}"#;
        let judgement: TutorJudgement = decode(text).unwrap();
        assert!(judgement.step_complete);
        assert_eq!(judgement.message, "Here you go:\n```\nscreen.fill(\"black\")\n```");
        assert_eq!(judgement.code.as_deref(), Some("screen.fill(\"black\")"));

        let fenced = format!("```json\n{}\n```", text);
        let judgement: TutorJudgement = decode(&fenced).unwrap();
        assert!(judgement.step_complete);
    }

    #[test]
    fn test_execution_defaults_commands() {
        let result: ExecutionResult =
            decode(r#"{"consoleOutput":"done","isSuccess":true,"isObjectiveMet":false}"#).unwrap();
        assert!(result.drawing_commands.is_empty());
    }

    #[test]
    fn test_execution_decodes_commands() {
        let result: ExecutionResult = decode(
            r##"{"consoleOutput":"","isSuccess":true,"isObjectiveMet":true,
                "drawingCommands":[{"type":"fill","color":"#000000"},{"type":"wobble"}]}"##,
        )
        .unwrap();
        assert_eq!(result.drawing_commands.len(), 2);
        assert_eq!(result.drawing_commands[1], DrawingCommand::Unsupported);
    }

    #[test]
    fn test_execution_rejects_bad_command() {
        let err = decode::<ExecutionResult>(
            r#"{"consoleOutput":"","isSuccess":true,"isObjectiveMet":true,
                "drawingCommands":[{"type":"rect","x":0,"y":0,"width":-5,"height":2,"color":"red"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
        assert!(err.message().contains("drawingCommands[0]"));

        let err = decode::<ExecutionResult>(
            r#"{"consoleOutput":"","isSuccess":true,"isObjectiveMet":true,
                "drawingCommands":[{"type":"circle","x":0,"y":0,"color":"red"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }

    #[test]
    fn test_schema_descriptors() {
        let contract = TutorJudgement::output_contract();
        assert_eq!(contract.name, "TutorJudgement");
        assert_eq!(contract.schema["required"], json!(["message", "stepComplete"]));

        let contract = ExecutionResult::output_contract();
        assert_eq!(
            contract.schema["properties"]["drawingCommands"]["type"],
            "ARRAY"
        );
    }
}
