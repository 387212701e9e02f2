//! Typed client for the remote assistants control API.
//!
//! The relay core talks to the remote service exclusively through the
//! [`AssistantsApi`] trait so tests can substitute a scripted backend for
//! the real HTTP implementation.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use thiserror::Error;

mod http;
mod sse;
mod types;

pub use http::{HttpAssistantsClient, HttpClientConfig};
pub use sse::{decode_frame, SseDecoder, SseFrame};
pub use types::{
    DeltaContent, RequiredAction, RunEvent, RunStatus, RunSummary, ToolCall, ToolFunction,
    ToolOutput,
};

/// Stream of decoded run events from one run (or one tool-output
/// continuation). Transport failures surface as `Err` items.
pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, ClientError>> + Send>>;

pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The remote rejected a message append because a run still owns the
    /// thread. Distinguished so the relay can report a retryable conflict.
    #[error("a run is already active on this thread: {message}")]
    ActiveRun { message: String },
    #[error("remote api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode '{event}' event payload")]
    Decode {
        event: String,
        source: serde_json::Error,
    },
    #[error("event stream transport failed: {message}")]
    Stream { message: String },
}

/// Control surface of the remote assistant-execution service.
///
/// Object-safe: methods return boxed futures so implementations (the HTTP
/// client, test backends) can live behind `Arc<dyn AssistantsApi>`.
pub trait AssistantsApi: Send + Sync + 'static {
    /// Issue a new conversation thread handle.
    fn create_thread(&self) -> ClientFuture<'_, String>;

    /// Authoritative listing of runs attached to a thread, newest first.
    fn list_runs(&self, thread_id: &str) -> ClientFuture<'_, Vec<RunSummary>>;

    /// Append a user message. Fails with [`ClientError::ActiveRun`] while a
    /// non-terminal run owns the thread.
    fn append_user_message(&self, thread_id: &str, text: &str) -> ClientFuture<'_, ()>;

    /// Create a run with streaming enabled and return its event stream.
    fn create_run_stream(&self, thread_id: &str) -> ClientFuture<'_, RunEventStream>;

    /// Submit one batch of tool outputs; the returned stream continues the
    /// run from where it paused.
    fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> ClientFuture<'_, RunEventStream>;

    /// Best-effort cancellation of a run.
    fn cancel_run(&self, thread_id: &str, run_id: &str) -> ClientFuture<'_, ()>;
}
