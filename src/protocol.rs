//! Wire messages for the realtime voice session.
//!
//! Both directions are JSON with a `"type"` tag. Deserialization is lenient
//! on purpose: unknown event types map to [`ServerEvent::Unknown`], several
//! event names carry aliases because the service renamed them between schema
//! revisions, and extra fields are ignored everywhere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages we send to the agent.
#[derive(Serialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// One capture frame, base64 PCM16 @ 16 kHz.
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },
    /// Ask the agent to stop the response it is currently producing.
    #[serde(rename = "response.cancel")]
    CancelResponse,
}

/// Events the agent sends us.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session lifecycle acknowledgements, inert beyond logging.
    #[serde(rename = "session.created")]
    SessionCreated {},
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    /// Audio chunk, base64 PCM16 @ 24 kHz.
    #[serde(
        rename = "response.audio.delta",
        alias = "response.output_audio.delta"
    )]
    AudioDelta { delta: String },
    /// The agent finished sending audio for this response.
    #[serde(rename = "response.audio.done", alias = "response.output_audio.done")]
    AudioDone {},
    /// The whole response is complete.
    #[serde(rename = "response.done")]
    ResponseDone {},
    /// Full transcript of what the agent said. Older servers put the line in
    /// `text`, newer ones in `transcript`; `text` wins when both appear.
    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    TranscriptDone {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        transcript: Option<String>,
    },
    /// A conversation item was committed (user or assistant turn).
    #[serde(rename = "conversation.item.created")]
    ItemCreated { item: ConversationItem },
    /// Finished transcription of what the user said.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },
    /// The user started talking; the current agent response is stale.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},
    #[serde(rename = "sentiment.update")]
    SentimentUpdate { sentiment: String },
    /// Recoverable server-side error, reported and otherwise ignored.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<Value>,
    },
    /// Anything this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parse one event and report the raw tag alongside it, so unknown
    /// types can be logged usefully.
    pub fn parse(text: &str) -> serde_json::Result<(Self, String)> {
        let value: Value = serde_json::from_str(text)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        let event = serde_json::from_value(value)?;
        Ok((event, tag))
    }
}

/// One committed conversation turn.
#[derive(Deserialize, Debug)]
pub struct ConversationItem {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// One content fragment inside a conversation item. Text turns carry
/// `text`, audio turns carry `transcript`.
#[derive(Deserialize, Debug)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ConversationItem {
    /// First non-empty text or transcript across the content parts.
    pub fn transcript(&self) -> Option<&str> {
        self.content
            .iter()
            .filter_map(|part| part.text.as_deref().or(part.transcript.as_deref()))
            .find(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_audio_wire_shape() {
        let msg = ClientMessage::AppendAudio { audio: "AQA=".into() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "input_audio_buffer.append", "audio": "AQA="})
        );
    }

    #[test]
    fn cancel_wire_shape() {
        let json = serde_json::to_value(&ClientMessage::CancelResponse).unwrap();
        assert_eq!(json, serde_json::json!({"type": "response.cancel"}));
    }

    #[test]
    fn audio_delta_parses_under_both_names() {
        for tag in ["response.audio.delta", "response.output_audio.delta"] {
            let text = format!(r#"{{"type": "{}", "delta": "UENN"}}"#, tag);
            let (event, seen) = ServerEvent::parse(&text).unwrap();
            assert_eq!(seen, tag);
            match event {
                ServerEvent::AudioDelta { delta } => assert_eq!(delta, "UENN"),
                other => panic!("parsed {:?}", other),
            }
        }
    }

    #[test]
    fn transcript_done_parses_under_both_names() {
        for tag in [
            "response.audio_transcript.done",
            "response.output_audio_transcript.done",
        ] {
            let raw = format!(r#"{{"type": "{}", "transcript": "hello"}}"#, tag);
            let (event, _) = ServerEvent::parse(&raw).unwrap();
            match event {
                ServerEvent::TranscriptDone { text, transcript } => {
                    assert_eq!(text, None);
                    assert_eq!(transcript.as_deref(), Some("hello"));
                }
                other => panic!("parsed {:?}", other),
            }
        }
    }

    #[test]
    fn transcript_done_carries_either_field() {
        let (event, _) = ServerEvent::parse(
            r#"{"type": "response.audio_transcript.done", "text": "old style"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::TranscriptDone { text, transcript } => {
                assert_eq!(text.as_deref(), Some("old style"));
                assert_eq!(transcript, None);
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn session_acks_and_completion_markers_are_recognized() {
        let cases = [
            r#"{"type": "session.created", "session": {"id": "sess_1"}}"#,
            r#"{"type": "session.updated", "session": {}}"#,
            r#"{"type": "response.done", "response": {"status": "completed"}}"#,
        ];
        for raw in cases {
            let (event, _) = ServerEvent::parse(raw).unwrap();
            assert!(
                matches!(
                    event,
                    ServerEvent::SessionCreated {}
                        | ServerEvent::SessionUpdated {}
                        | ServerEvent::ResponseDone {}
                ),
                "parsed {:?}",
                event
            );
        }
    }

    #[test]
    fn input_transcription_completed_parses() {
        let (event, _) = ServerEvent::parse(
            r#"{"type": "conversation.item.input_audio_transcription.completed",
                "item_id": "it_2", "transcript": "what time is it"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "what time is it");
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn unknown_type_maps_to_unknown() {
        let (event, tag) =
            ServerEvent::parse(r#"{"type": "rate_limits.updated", "limits": []}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
        assert_eq!(tag, "rate_limits.updated");
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let (event, _) = ServerEvent::parse(
            r#"{"type": "input_audio_buffer.speech_started", "event_id": "ev_1", "item_id": "it_9"}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::SpeechStarted {}));
    }

    #[test]
    fn item_created_extracts_role_and_content() {
        let text = r#"{
            "type": "conversation.item.created",
            "item": {
                "id": "item_3",
                "role": "user",
                "content": [
                    {"type": "input_audio", "transcript": "turn the lights off"}
                ]
            }
        }"#;
        let (event, _) = ServerEvent::parse(text).unwrap();
        match event {
            ServerEvent::ItemCreated { item } => {
                assert_eq!(item.role, "user");
                assert_eq!(item.transcript(), Some("turn the lights off"));
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn item_text_preferred_within_a_part() {
        let item = ConversationItem {
            role: "assistant".into(),
            content: vec![
                ContentPart { text: None, transcript: Some("".into()) },
                ContentPart { text: Some("done".into()), transcript: None },
            ],
        };
        assert_eq!(item.transcript(), Some("done"));
    }

    #[test]
    fn item_without_content_has_no_transcript() {
        let (event, _) = ServerEvent::parse(
            r#"{"type": "conversation.item.created", "item": {"role": "assistant"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ItemCreated { item } => assert_eq!(item.transcript(), None),
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn missing_type_tag_is_an_error() {
        assert!(ServerEvent::parse(r#"{"delta": "UENN"}"#).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerEvent::parse("not json").is_err());
    }

    #[test]
    fn error_event_parses_with_and_without_detail() {
        let (event, _) = ServerEvent::parse(
            r#"{"type": "error", "error": {"message": "overloaded", "code": 429}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Error { error } => assert!(error.is_some()),
            other => panic!("parsed {:?}", other),
        }
        let (event, _) = ServerEvent::parse(r#"{"type": "error"}"#).unwrap();
        assert!(matches!(event, ServerEvent::Error { error: None }));
    }
}
