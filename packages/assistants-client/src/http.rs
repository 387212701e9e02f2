use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::sse::{decode_frame, SseDecoder};
use crate::types::ListRunsResponse;
use crate::{
    AssistantsApi, ClientError, ClientFuture, RunEvent, RunEventStream, RunSummary, ToolOutput,
};

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub assistant_id: String,
}

/// reqwest-backed implementation of the assistants control surface.
pub struct HttpAssistantsClient {
    client: Client,
    base_url: String,
    assistant_id: String,
}

impl HttpAssistantsClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ClientError::Stream {
                message: "api key contains invalid header characters".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(BETA_HEADER, HeaderValue::from_static(BETA_VALUE));

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            assistant_id: config.assistant_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn open_event_stream(&self, request: RequestBuilder) -> Result<RunEventStream, ClientError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        Ok(decode_body_stream(response.bytes_stream()))
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status, &body))
}

/// Map a non-2xx body onto the client error taxonomy. The remote reports an
/// in-flight run on message append as a plain 400; the machine-readable
/// `error.code` is preferred when present, with the prose message as the
/// fallback signal since older responses omit the code.
fn classify_error(status: StatusCode, body: &str) -> ClientError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.pointer(&format!("/error/{name}")))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let message = field("message").unwrap_or_else(|| body.to_string());

    if status == StatusCode::BAD_REQUEST {
        let coded_active = field("code").is_some_and(|code| code.contains("active"));
        let worded_active = message.contains("while a run") && message.contains("is active");
        if coded_active || worded_active {
            return ClientError::ActiveRun { message };
        }
    }

    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Turn a raw SSE body into a stream of decoded run events. Frames that
/// decode to nothing (keep-alives, the done sentinel) are skipped; payload
/// decode failures and transport errors surface as `Err` items.
fn decode_body_stream<S>(body: S) -> RunEventStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = (
        Box::pin(body),
        SseDecoder::new(),
        VecDeque::<Result<RunEvent, ClientError>>::new(),
        false,
    );
    Box::pin(stream::unfold(
        state,
        |(mut body, mut decoder, mut pending, mut failed)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (body, decoder, pending, failed)));
                }
                if failed {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => {
                        for frame in decoder.push(&chunk) {
                            match decode_frame(&frame) {
                                Ok(Some(event)) => pending.push_back(Ok(event)),
                                Ok(None) => {}
                                Err(err) => {
                                    tracing::warn!(
                                        event = %frame.event,
                                        error = %err,
                                        "failed to decode stream event payload"
                                    );
                                    pending.push_back(Err(err));
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        failed = true;
                        pending.push_back(Err(ClientError::Stream {
                            message: err.to_string(),
                        }));
                    }
                    None => return None,
                }
            }
        },
    ))
}

impl AssistantsApi for HttpAssistantsClient {
    fn create_thread(&self) -> ClientFuture<'_, String> {
        Box::pin(async move {
            #[derive(serde::Deserialize)]
            struct ThreadObject {
                id: String,
            }
            let thread: ThreadObject = self
                .send_json(self.client.post(self.url("/threads")).json(&json!({})))
                .await?;
            Ok(thread.id)
        })
    }

    fn list_runs(&self, thread_id: &str) -> ClientFuture<'_, Vec<RunSummary>> {
        let url = self.url(&format!("/threads/{thread_id}/runs"));
        Box::pin(async move {
            let runs: ListRunsResponse = self.send_json(self.client.get(url)).await?;
            Ok(runs.data)
        })
    }

    fn append_user_message(&self, thread_id: &str, text: &str) -> ClientFuture<'_, ()> {
        let url = self.url(&format!("/threads/{thread_id}/messages"));
        let body = json!({ "role": "user", "content": text });
        Box::pin(async move {
            let response = self.client.post(url).json(&body).send().await?;
            check_status(response).await?;
            Ok(())
        })
    }

    fn create_run_stream(&self, thread_id: &str) -> ClientFuture<'_, RunEventStream> {
        let url = self.url(&format!("/threads/{thread_id}/runs"));
        let body = json!({ "assistant_id": self.assistant_id, "stream": true });
        Box::pin(async move { self.open_event_stream(self.client.post(url).json(&body)).await })
    }

    fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> ClientFuture<'_, RunEventStream> {
        let url = self.url(&format!(
            "/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
        ));
        let body = json!({ "tool_outputs": outputs, "stream": true });
        Box::pin(async move { self.open_event_stream(self.client.post(url).json(&body)).await })
    }

    fn cancel_run(&self, thread_id: &str, run_id: &str) -> ClientFuture<'_, ()> {
        let url = self.url(&format!("/threads/{thread_id}/runs/{run_id}/cancel"));
        Box::pin(async move {
            let response = self.client.post(url).send().await?;
            check_status(response).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunks(parts: &[&str]) -> Vec<reqwest::Result<Bytes>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn body_stream_decodes_events_across_chunk_boundaries() {
        let body = stream::iter(chunks(&[
            "event: thread.run.crea",
            "ted\ndata: {\"id\":\"run_1\"}\n\nevent: thread.run.comp",
            "leted\ndata: {}\n\nevent: done\ndata: [DONE]\n\n",
        ]));
        let events: Vec<_> = decode_body_stream(body).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Ok(RunEvent::RunCreated { ref run_id }) if run_id == "run_1"
        ));
        assert!(matches!(events[1], Ok(RunEvent::RunCompleted)));
    }

    #[tokio::test]
    async fn undecodable_payload_surfaces_as_an_error_item() {
        let body = stream::iter(chunks(&[
            "event: thread.run.created\ndata: not json\n\nevent: thread.run.completed\ndata: {}\n\n",
        ]));
        let events: Vec<_> = decode_body_stream(body).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Err(ClientError::Decode { .. })));
        assert!(matches!(events[1], Ok(RunEvent::RunCompleted)));
    }

    #[test]
    fn active_run_rejection_is_detected_from_the_message() {
        let body = r#"{"error":{"message":"Can't add messages to thread_1 while a run run_2 is active."}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            ClientError::ActiveRun { .. }
        ));
    }

    #[test]
    fn active_run_rejection_is_detected_from_the_error_code() {
        let body =
            r#"{"error":{"message":"A run already owns this thread.","code":"thread_run_active"}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            ClientError::ActiveRun { .. }
        ));
    }

    #[test]
    fn other_bad_requests_stay_generic_api_errors() {
        let body = r#"{"error":{"message":"Invalid assistant id.","code":"invalid_request"}}"#;
        match classify_error(StatusCode::BAD_REQUEST, body) {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid assistant id.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
