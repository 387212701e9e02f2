//! Scripted [`AssistantsApi`] backend for tests.
//!
//! Streams are queued up front with [`ScriptedBackend::push_stream`] and
//! handed out in order: the first queued script answers `create_run_stream`,
//! subsequent ones answer each `submit_tool_outputs_stream` continuation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use assistant_relay_assistants_client::{
    AssistantsApi, ClientError, ClientFuture, RunEvent, RunEventStream, RunSummary, ToolOutput,
};
use futures::stream;

type Script = Vec<Result<RunEvent, ClientError>>;

#[derive(Default)]
pub struct ScriptedBackend {
    thread_counter: AtomicU64,
    fail_next_create_thread: AtomicBool,
    fail_next_append: AtomicBool,
    fail_cancel: AtomicBool,
    runs: Mutex<Vec<RunSummary>>,
    streams: Mutex<VecDeque<Script>>,
    appended: Mutex<Vec<(String, String)>>,
    submitted: Mutex<Vec<(String, Vec<ToolOutput>)>>,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads_created(&self) -> u64 {
        self.thread_counter.load(Ordering::SeqCst)
    }

    pub fn fail_next_create_thread(&self) {
        self.fail_next_create_thread.store(true, Ordering::SeqCst);
    }

    /// Make the next message append fail the way the remote does when a run
    /// still owns the thread.
    pub fn fail_next_append_with_active_run(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    /// Fix what `list_runs` reports, regardless of thread id.
    pub fn set_runs(&self, runs: Vec<RunSummary>) {
        *self.runs.lock().unwrap() = runs;
    }

    pub fn push_stream(&self, script: Script) {
        self.streams.lock().unwrap().push_back(script);
    }

    pub fn appended(&self) -> Vec<(String, String)> {
        self.appended.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(String, Vec<ToolOutput>)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn next_stream(&self) -> RunEventStream {
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Box::pin(stream::iter(script))
    }
}

impl AssistantsApi for ScriptedBackend {
    fn create_thread(&self) -> ClientFuture<'_, String> {
        Box::pin(async move {
            if self.fail_next_create_thread.swap(false, Ordering::SeqCst) {
                return Err(ClientError::Api {
                    status: 500,
                    message: "scripted thread creation failure".to_string(),
                });
            }
            let n = self.thread_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("thread_{n}"))
        })
    }

    fn list_runs(&self, _thread_id: &str) -> ClientFuture<'_, Vec<RunSummary>> {
        Box::pin(async move { Ok(self.runs.lock().unwrap().clone()) })
    }

    fn append_user_message(&self, thread_id: &str, text: &str) -> ClientFuture<'_, ()> {
        let thread_id = thread_id.to_string();
        let text = text.to_string();
        Box::pin(async move {
            if self.fail_next_append.swap(false, Ordering::SeqCst) {
                return Err(ClientError::ActiveRun {
                    message: format!("Can't add messages to {thread_id} while a run is active."),
                });
            }
            self.appended.lock().unwrap().push((thread_id, text));
            Ok(())
        })
    }

    fn create_run_stream(&self, _thread_id: &str) -> ClientFuture<'_, RunEventStream> {
        Box::pin(async move { Ok(self.next_stream()) })
    }

    fn submit_tool_outputs_stream(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> ClientFuture<'_, RunEventStream> {
        let run_id = run_id.to_string();
        Box::pin(async move {
            self.submitted.lock().unwrap().push((run_id, outputs));
            Ok(self.next_stream())
        })
    }

    fn cancel_run(&self, _thread_id: &str, run_id: &str) -> ClientFuture<'_, ()> {
        let run_id = run_id.to_string();
        Box::pin(async move {
            if self.fail_cancel.load(Ordering::SeqCst) {
                return Err(ClientError::Api {
                    status: 500,
                    message: "scripted cancel failure".to_string(),
                });
            }
            self.cancelled.lock().unwrap().push(run_id);
            Ok(())
        })
    }
}
