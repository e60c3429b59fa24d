//! Gemini Live `BidiGenerateContent` wire messages
//!
//! Client messages are externally tagged JSON objects (`{"setup": ...}`,
//! `{"realtimeInput": ...}`, `{"toolResponse": ...}`). Server messages may
//! carry several signals at once and are flattened into [`ServerEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::OUTPUT_SAMPLE_RATE;
use crate::tools::{ToolInvocation, ToolResult};
use crate::{Error, Result};

/// MIME type of outbound camera frames
pub const JPEG_MIME: &str = "image/jpeg";

/// A message sent from the client to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on a connection: model, voice, instruction, tools
    Setup(Setup),
    /// Streamed media (microphone audio, camera frames)
    RealtimeInput(RealtimeInput),
    /// Results of tool calls
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Wrap one media chunk as realtime input
    #[must_use]
    pub fn media(chunk: MediaChunk) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![chunk],
        })
    }

    /// Wrap one tool result as a tool response
    #[must_use]
    pub fn tool_result(result: ToolResult) -> Self {
        Self::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: result.id,
                name: result.name,
                response: FunctionOutput {
                    result: result.result,
                },
            }],
        })
    }
}

/// Session setup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name (`models/...`)
    pub model: String,
    /// Response modality and voice
    pub generation_config: GenerationConfig,
    /// System instruction for this connection
    pub system_instruction: Content,
    /// Declared tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Request transcripts of the user's audio
    pub input_audio_transcription: Empty,
    /// Request transcripts of the model's audio
    pub output_audio_transcription: Empty,
}

impl Setup {
    /// Build an audio-only setup for `model` speaking with `voice`
    #[must_use]
    pub fn new(model: &str, voice: &str, instruction: &str, declarations: Vec<Value>) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };

        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![Tool {
                function_declarations: declarations,
            }]
        };

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: instruction.to_string(),
                }],
            },
            tools,
            input_audio_transcription: Empty {},
            output_audio_transcription: Empty {},
        }
    }
}

/// Serializes as `{}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<Value>,
}

/// Streamed media input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Media chunks, normally exactly one
    pub media_chunks: Vec<MediaChunk>,
}

/// A base64 payload tagged with its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    /// MIME type, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

impl MediaChunk {
    /// A 16-bit PCM audio chunk at `sample_rate`
    #[must_use]
    pub fn pcm16(data: String, sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            data,
        }
    }

    /// A JPEG image chunk
    #[must_use]
    pub fn jpeg(data: String) -> Self {
        Self {
            mime_type: JPEG_MIME.to_string(),
            data,
        }
    }
}

/// Tool call results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: FunctionOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionOutput {
    pub result: String,
}

/// One signal from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Setup accepted; the session is live
    SetupComplete,
    /// Fragment of the user's speech transcript
    InputTranscript(String),
    /// Fragment of the model's speech transcript
    OutputTranscript(String),
    /// The user barged in; stop playing model audio
    Interrupted,
    /// Base64 16-bit PCM audio from the model
    Audio {
        /// Base64 payload
        data: String,
        /// Sample rate declared in the MIME type
        sample_rate: u32,
        /// Channel count
        channels: u16,
    },
    /// The model wants a tool run
    ToolCall(ToolInvocation),
    /// The model finished its turn
    TurnComplete,
    /// The backend will close the connection soon
    GoAway,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCallMessage>,
    go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallMessage {
    #[serde(default)]
    function_calls: Vec<Value>,
}

/// Parse one server frame into events, in the order they should be handled
///
/// Transcripts come first, then an interruption (so it cannot cut audio that
/// arrived in the same frame), then audio, tool calls and turn completion.
///
/// # Errors
///
/// Returns error if the frame is not valid JSON
pub fn parse_server_message(raw: &str) -> Result<Vec<ServerEvent>> {
    let message: ServerMessage = serde_json::from_str(raw)
        .map_err(|e| Error::Protocol(format!("invalid server message: {e}")))?;

    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = message.server_content {
        if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ServerEvent::InputTranscript(t.text));
        }
        if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ServerEvent::OutputTranscript(t.text));
        }
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        let parts = content.model_turn.map(|t| t.parts).unwrap_or_default();
        for part in parts.into_iter().filter_map(decode_item::<Part>) {
            if let Some(inline) = part
                .inline_data
                .filter(|d| is_audio(&d.mime_type) && !d.data.is_empty())
            {
                events.push(ServerEvent::Audio {
                    sample_rate: mime_rate(&inline.mime_type).unwrap_or(OUTPUT_SAMPLE_RATE),
                    channels: 1,
                    data: inline.data,
                });
            }
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(call) = message.tool_call {
        // Tool calls go before a turn completion carried in the same frame
        let at = events
            .iter()
            .position(|e| *e == ServerEvent::TurnComplete)
            .unwrap_or(events.len());
        events.splice(
            at..at,
            call.function_calls
                .into_iter()
                .filter_map(decode_item::<ToolInvocation>)
                .map(ServerEvent::ToolCall),
        );
    }

    if message.go_away.is_some() {
        events.push(ServerEvent::GoAway);
    }

    Ok(events)
}

/// Decode one item of a list, skipping it if malformed
fn decode_item<T: serde::de::DeserializeOwned>(value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed item in server message");
            None
        }
    }
}

/// Audio parts without a MIME type are treated as PCM
fn is_audio(mime: &str) -> bool {
    mime.is_empty() || mime.starts_with("audio/")
}

/// Extract `rate=N` from a MIME type such as `audio/pcm;rate=24000`
fn mime_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}
