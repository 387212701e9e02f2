//! Incremental decoder for the remote service's `text/event-stream` body.
//!
//! The remote emits frames of the form `event: <name>\ndata: <json>\n\n`.
//! Chunks arrive at arbitrary byte boundaries, so the decoder buffers until
//! a blank line completes a frame.

use crate::types::{
    DeltaContent, DeltaContentPart, MessageDeltaObject, RequiredAction, RunEvent, RunObject,
};
use crate::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of body bytes, returning every frame completed by it.
    /// Invalid UTF-8 is replaced rather than failing the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else if let Some(rest) = field_value(line, "event") {
                self.event = Some(rest.to_string());
            } else if let Some(rest) = field_value(line, "data") {
                self.data_lines.push(rest.to_string());
            }
            // Comment lines (leading ':') and unknown fields are ignored.
        }
        frames
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data_lines).join("\n");
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Map one SSE frame onto the run event model. `Ok(None)` means the frame
/// carries nothing the relay consumes (the `done` sentinel, keep-alives).
/// Errors indicate a recognized event whose payload failed to parse.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<RunEvent>, ClientError> {
    let event = match frame.event.as_str() {
        "thread.run.created" => {
            let run: RunObject = parse(frame)?;
            RunEvent::RunCreated { run_id: run.id }
        }
        "thread.message.delta" => {
            let delta: MessageDeltaObject = parse(frame)?;
            let content = delta
                .delta
                .content
                .into_iter()
                .map(|part| match part {
                    DeltaContentPart::Text { text } => DeltaContent::Text { value: text.value },
                    DeltaContentPart::Other => DeltaContent::Other,
                })
                .collect();
            RunEvent::MessageDelta { content }
        }
        "thread.run.requires_action" => {
            let run: RunObject = parse(frame)?;
            let action = match run.required_action {
                Some(required) if required.action_type == "submit_tool_outputs" => {
                    RequiredAction::SubmitToolOutputs {
                        tool_calls: required
                            .submit_tool_outputs
                            .map(|s| s.tool_calls)
                            .unwrap_or_default(),
                    }
                }
                Some(required) => RequiredAction::Other {
                    action_type: required.action_type,
                },
                None => RequiredAction::Other {
                    action_type: "missing".to_string(),
                },
            };
            RunEvent::RequiresAction {
                run_id: run.id,
                action,
            }
        }
        "thread.run.completed" => RunEvent::RunCompleted,
        "thread.run.failed" => {
            let run: RunObject = parse(frame)?;
            RunEvent::RunFailed {
                message: run.last_error.and_then(|e| e.message),
            }
        }
        "done" => return Ok(None),
        other => {
            tracing::debug!(event = other, "skipping unhandled stream event");
            RunEvent::Unknown {
                event: other.to_string(),
            }
        }
    };
    Ok(Some(event))
}

fn parse<T: serde::de::DeserializeOwned>(frame: &SseFrame) -> Result<T, ClientError> {
    serde_json::from_str(&frame.data).map_err(|err| ClientError::Decode {
        event: frame.event.clone(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: thread.run.cre").is_empty());
        assert!(decoder.push(b"ated\ndata: {\"id\":\"run_1\"}\n").is_empty());
        let frames = decoder.push(b"\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "thread.run.created".to_string(),
                data: "{\"id\":\"run_1\"}".to_string(),
            }]
        );
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(
            b"event: thread.run.completed\ndata: {}\n\nevent: done\ndata: [DONE]\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "thread.run.completed");
        assert_eq!(frames[1].event, "done");
    }

    #[test]
    fn ignores_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\r\nevent: thread.run.completed\r\ndata: {}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "thread.run.completed");
    }

    #[test]
    fn delta_maps_to_text_content() {
        let frame = SseFrame {
            event: "thread.message.delta".to_string(),
            data: r#"{"delta":{"content":[{"type":"text","text":{"value":"Hello"}}]}}"#.to_string(),
        };
        match decode_frame(&frame).unwrap().unwrap() {
            RunEvent::MessageDelta { content } => match &content[0] {
                DeltaContent::Text { value } => assert_eq!(value, "Hello"),
                other => panic!("unexpected content: {other:?}"),
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn requires_action_maps_tool_calls() {
        let frame = SseFrame {
            event: "thread.run.requires_action".to_string(),
            data: r#"{"id":"run_9","required_action":{"type":"submit_tool_outputs","submit_tool_outputs":{"tool_calls":[{"id":"call_1","function":{"name":"get_time","arguments":"{}"}}]}}}"#.to_string(),
        };
        match decode_frame(&frame).unwrap().unwrap() {
            RunEvent::RequiresAction { run_id, action } => {
                assert_eq!(run_id, "run_9");
                match action {
                    RequiredAction::SubmitToolOutputs { tool_calls } => {
                        assert_eq!(tool_calls.len(), 1);
                        assert_eq!(tool_calls[0].function.name, "get_time");
                    }
                    other => panic!("unexpected action: {other:?}"),
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_subtype_is_preserved() {
        let frame = SseFrame {
            event: "thread.run.requires_action".to_string(),
            data: r#"{"id":"run_9","required_action":{"type":"approve_something"}}"#.to_string(),
        };
        match decode_frame(&frame).unwrap().unwrap() {
            RunEvent::RequiresAction {
                action: RequiredAction::Other { action_type },
                ..
            } => assert_eq!(action_type, "approve_something"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn done_sentinel_is_skipped_and_unknown_events_pass_through() {
        let done = SseFrame {
            event: "done".to_string(),
            data: "[DONE]".to_string(),
        };
        assert!(decode_frame(&done).unwrap().is_none());

        let other = SseFrame {
            event: "thread.message.completed".to_string(),
            data: "{}".to_string(),
        };
        match decode_frame(&other).unwrap().unwrap() {
            RunEvent::Unknown { event } => assert_eq!(event, "thread.message.completed"),
            ev => panic!("unexpected event: {ev:?}"),
        }
    }

    #[test]
    fn malformed_payload_for_known_event_is_an_error() {
        let frame = SseFrame {
            event: "thread.run.created".to_string(),
            data: "not json".to_string(),
        };
        assert!(decode_frame(&frame).is_err());
    }
}
