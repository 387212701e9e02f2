use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assistant_relay_assistants_client::{
    AssistantsApi, ClientError, DeltaContent, RequiredAction, RunEvent, RunEventStream,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::framer::{FrameSink, OutputFrame};
use crate::sessions::Session;
use crate::tools::ToolDispatcher;

const COMPLETED_STATUS: &str = "completed";
const RUN_FAILED_MESSAGE: &str = "Assistant run failed";
const UNSUPPORTED_ACTION_MESSAGE: &str = "Unsupported action type";
const STREAM_FAILED_MESSAGE: &str = "Assistant stream failed";

#[derive(Debug, Clone, Default)]
pub struct TurnConfig {
    /// Status text shown when the run produces no output for
    /// `waiting_delay`. No timer is armed when unset.
    pub waiting_message: Option<String>,
    pub waiting_delay: Duration,
}

/// Drive one client turn to completion: pump the run's event stream,
/// dispatch tool calls, follow continuation streams, and emit output
/// frames.
///
/// The session's `active` flag is cleared exactly once, on every exit path,
/// by the guard below; the trampoline never touches it.
pub async fn run_turn(
    session: Arc<Session>,
    thread_id: &str,
    api: &dyn AssistantsApi,
    dispatcher: &ToolDispatcher,
    sink: Arc<FrameSink>,
    config: &TurnConfig,
    initial: RunEventStream,
) {
    struct ActiveGuard(Arc<Session>);
    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.set_active(false);
        }
    }
    let _guard = ActiveGuard(session.clone());

    drive(&session, thread_id, api, dispatcher, sink, config, initial).await;
}

enum Flow {
    Continue,
    /// A tool-output submission returned a continuation stream; resume
    /// consumption there.
    Swap(RunEventStream),
    Terminal,
}

/// Trampoline over the current event stream. Tool-call chains swap in the
/// continuation stream returned by each submission instead of recursing, so
/// arbitrarily long chains hold one stack frame.
async fn drive(
    session: &Session,
    thread_id: &str,
    api: &dyn AssistantsApi,
    dispatcher: &ToolDispatcher,
    sink: Arc<FrameSink>,
    config: &TurnConfig,
    initial: RunEventStream,
) {
    let mut stream = initial;
    let mut timer = WaitingTimer::new();

    loop {
        let Some(item) = stream.next().await else {
            break;
        };
        match item {
            Ok(event) => {
                match handle_event(session, thread_id, api, dispatcher, &sink, config, &mut timer, event)
                    .await
                {
                    Flow::Continue => {}
                    Flow::Swap(continuation) => stream = continuation,
                    Flow::Terminal => break,
                }
            }
            // A recognized event with a payload we could not decode: report
            // it and keep consuming the rest of the stream.
            Err(err @ ClientError::Decode { .. }) => {
                tracing::warn!(error = %err, "skipping undecodable event");
                sink.send(OutputFrame::error(err.to_string())).await;
            }
            // Transport-level failure: the turn cannot make progress.
            Err(err) => {
                tracing::error!(error = %err, "event stream transport failed");
                sink.send(OutputFrame::error(STREAM_FAILED_MESSAGE)).await;
                sink.close();
                break;
            }
        }
    }

    timer.cancel();
}

#[allow(clippy::too_many_arguments)]
async fn handle_event(
    session: &Session,
    thread_id: &str,
    api: &dyn AssistantsApi,
    dispatcher: &ToolDispatcher,
    sink: &Arc<FrameSink>,
    config: &TurnConfig,
    timer: &mut WaitingTimer,
    event: RunEvent,
) -> Flow {
    match event {
        RunEvent::RunCreated { run_id } => {
            tracing::debug!(session_id = %session.id(), run_id = %run_id, "run created");
            if let Some(message) = &config.waiting_message {
                timer.arm(sink.clone(), message.clone(), config.waiting_delay);
            }
            Flow::Continue
        }
        RunEvent::MessageDelta { content } => {
            timer.cancel();
            if let Some(DeltaContent::Text { value }) = content.into_iter().next() {
                sink.send(OutputFrame::text(value)).await;
            }
            Flow::Continue
        }
        RunEvent::RequiresAction { run_id, action } => {
            timer.cancel();
            match action {
                RequiredAction::SubmitToolOutputs { tool_calls } => {
                    let mut outputs = Vec::with_capacity(tool_calls.len());
                    for call in &tool_calls {
                        outputs.push(dispatcher.dispatch(session.id(), call).await);
                    }
                    match api
                        .submit_tool_outputs_stream(thread_id, &run_id, outputs)
                        .await
                    {
                        Ok(continuation) => Flow::Swap(continuation),
                        Err(err) => {
                            tracing::error!(
                                run_id = %run_id,
                                error = %err,
                                "tool output submission failed"
                            );
                            sink.send(OutputFrame::error(STREAM_FAILED_MESSAGE)).await;
                            sink.close();
                            Flow::Terminal
                        }
                    }
                }
                RequiredAction::Other { action_type } => {
                    tracing::warn!(action_type = %action_type, "unsupported required action");
                    sink.send(OutputFrame::error(UNSUPPORTED_ACTION_MESSAGE)).await;
                    Flow::Continue
                }
            }
        }
        RunEvent::RunCompleted => {
            sink.send(OutputFrame::status(COMPLETED_STATUS)).await;
            sink.close();
            Flow::Terminal
        }
        RunEvent::RunFailed { message } => {
            tracing::warn!(
                session_id = %session.id(),
                reason = message.as_deref().unwrap_or("unknown"),
                "run failed"
            );
            sink.send(OutputFrame::error(RUN_FAILED_MESSAGE)).await;
            sink.close();
            Flow::Terminal
        }
        RunEvent::Unknown { event } => {
            tracing::debug!(event = %event, "ignoring unrecognized event");
            Flow::Continue
        }
    }
}

/// One-shot timer behind the optional waiting message. The `fired` flag is
/// single-use: whichever of the timer task and `cancel` transitions it
/// first wins, so a cancelled timer can never emit even if the abort races
/// its expiry.
struct WaitingTimer {
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl WaitingTimer {
    fn new() -> Self {
        Self {
            handle: None,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    fn arm(&mut self, sink: Arc<FrameSink>, message: String, delay: Duration) {
        if self.handle.is_some() || self.fired.load(Ordering::SeqCst) {
            return;
        }
        let fired = self.fired.clone();
        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            if fired
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                sink.send(OutputFrame::status(message)).await;
            }
        }));
    }

    fn cancel(&mut self) {
        self.fired.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WaitingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
