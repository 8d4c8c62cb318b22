//! Wire message types for the live-session protocol
//!
//! The service multiplexes everything over one WebSocket as single-purpose
//! JSON objects: the client sends `setup`, `realtimeInput` and
//! `toolResponse`; the server sends `setupComplete`, `serverContent` and
//! `toolCall`. Audio payloads are base64 PCM inside `inlineData` /
//! `mediaChunks` fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;

// ── Client → server ────────────────────────────────────────────────

/// Top-level client message; exactly one field is set per message
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<Setup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input: Option<RealtimeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponseMessage>,
}

impl ClientMessage {
    /// Session-open configuration: model, voice, system instruction, and
    /// the tool catalog passed through unchanged
    pub fn setup(config: &EngineConfig, tools: Vec<Value>) -> Self {
        Self {
            setup: Some(Setup {
                model: config.model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: config.system_instruction.clone(),
                    }],
                },
                tools,
            }),
            realtime_input: None,
            tool_response: None,
        }
    }

    /// One encoded capture frame as a realtime media chunk
    pub fn audio_frame(base64_pcm: String, sample_rate: u32) -> Self {
        Self {
            setup: None,
            realtime_input: Some(RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: format!("audio/pcm;rate={sample_rate}"),
                    data: base64_pcm,
                }],
            }),
            tool_response: None,
        }
    }

    /// A single tool response correlated by the originating call id
    pub fn tool_response(id: String, name: String, result: String) -> Self {
        Self {
            setup: None,
            realtime_input: None,
            tool_response: Some(ToolResponseMessage {
                function_responses: vec![FunctionResponse {
                    id,
                    name,
                    response: FunctionResult { result },
                }],
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: FunctionResult,
}

#[derive(Debug, Serialize)]
pub struct FunctionResult {
    pub result: String,
}

// ── Server → client ────────────────────────────────────────────────

/// Top-level server message; fields are independent and may co-occur
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCallMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub title: Option<String>,
    pub uri: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallMessage {
    #[serde(default)]
    pub function_calls: Vec<FunctionCallWire>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCallWire {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_serializes_catalog_unchanged() {
        let config = EngineConfig::default();
        let catalog = vec![serde_json::json!({"functionDeclarations": [{"name": "manageTasks"}]})];
        let msg = ClientMessage::setup(&config, catalog.clone());

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["setup"]["model"], config.model);
        assert_eq!(json["setup"]["tools"], serde_json::Value::Array(catalog));
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert!(json.get("realtimeInput").is_none());
    }

    #[test]
    fn audio_frame_carries_pcm_mime_type() {
        let msg = ClientMessage::audio_frame("QUJD".to_string(), 16_000);
        let json = serde_json::to_value(&msg).unwrap();
        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "QUJD");
    }

    #[test]
    fn tool_response_echoes_id_and_name() {
        let msg =
            ClientMessage::tool_response("call-7".into(), "manageTasks".into(), "done".into());
        let json = serde_json::to_value(&msg).unwrap();
        let response = &json["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "call-7");
        assert_eq!(response["name"], "manageTasks");
        assert_eq!(response["response"]["result"], "done");
    }

    #[test]
    fn server_content_with_audio_and_grounding_parses() {
        let payload = serde_json::json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}}]
                },
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"title": "Docs", "uri": "https://example.com"}},
                        {"retrievedContext": {}}
                    ]
                }
            }
        });

        let msg: ServerMessage = serde_json::from_value(payload).unwrap();
        let content = msg.server_content.unwrap();
        let turn = content.model_turn.unwrap();
        assert_eq!(turn.parts[0].inline_data.as_ref().unwrap().data, "AAA=");

        let grounding = content.grounding_metadata.unwrap();
        assert_eq!(grounding.grounding_chunks.len(), 2);
        assert!(grounding.grounding_chunks[1].web.is_none());
    }

    #[test]
    fn tool_call_batch_parses() {
        let payload = serde_json::json!({
            "toolCall": {
                "functionCalls": [
                    {"id": "a", "name": "manageTasks", "args": {"action": "create"}},
                    {"name": "logMood", "args": {"score": 4}}
                ]
            }
        });

        let msg: ServerMessage = serde_json::from_value(payload).unwrap();
        let calls = msg.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("a"));
        assert_eq!(calls[1].name, "logMood");
        assert!(calls[1].id.is_none());
    }
}
