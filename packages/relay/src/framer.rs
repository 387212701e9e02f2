use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use utoipa::ToSchema;

/// The unit written to the client channel. Frames are concatenated JSON
/// objects on a keep-alive text stream; a frame is never rewritten once
/// sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct OutputFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Text,
    Status,
    Error,
}

impl OutputFrame {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            frame_type: FrameType::Text,
            content: content.into(),
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self {
            frame_type: FrameType::Status,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            frame_type: FrameType::Error,
            content: content.into(),
        }
    }
}

/// Writes frames to the client body channel.
///
/// Once closed (explicitly, or because the client went away) every further
/// send is a silent no-op; a failed write is logged and never surfaced to
/// the turn processor.
pub struct FrameSink {
    sender: mpsc::Sender<Bytes>,
    closed: AtomicBool,
}

impl FrameSink {
    pub fn new(sender: mpsc::Sender<Bytes>) -> Self {
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting frames. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn send(&self, frame: OutputFrame) {
        if self.is_closed() {
            return;
        }
        let payload = match serde_json::to_vec(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize output frame");
                return;
            }
        };
        if self.sender.send(Bytes::from(payload)).await.is_err() {
            tracing::debug!("client channel closed, dropping further frames");
            self.close();
        }
    }
}
