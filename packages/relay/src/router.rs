use std::convert::Infallible;
use std::sync::Arc;

use assistant_relay_assistants_client::{AssistantsApi, ClientError};
use assistant_relay_error::{ErrorBody, RelayError};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};

use crate::admission::{self, AdmissionOutcome, AdmissionPolicy};
use crate::framer::{FrameSink, FrameType, OutputFrame};
use crate::sessions::SessionRegistry;
use crate::tools::ToolDispatcher;
use crate::turn::{run_turn, TurnConfig};

const FRAME_CHANNEL_SIZE: usize = 64;

pub struct AppState {
    pub registry: SessionRegistry,
    pub api: Arc<dyn AssistantsApi>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub turn: TurnConfig,
    pub admission: AdmissionPolicy,
}

#[derive(Debug, Serialize, JsonSchema, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(get_health, post_chat),
    components(schemas(HealthResponse, ChatRequest, ErrorBody, OutputFrame, FrameType))
)]
pub struct ApiDoc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(get_health))
        .route("/v1/chat", post(post_chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Keep-alive stream of concatenated JSON output frames"),
        (status = 400, description = "Missing field", body = ErrorBody),
        (status = 429, description = "Another run is active for the session", body = ErrorBody),
        (status = 502, description = "Remote assistants API failure", body = ErrorBody)
    )
)]
async fn post_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    match start_turn(state, request).await {
        Ok(body) => {
            let mut response = Response::new(body);
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Err(err) => error_response(&err),
    }
}

/// Validate, admit, kick off the remote run, and hand back the streaming
/// body. Every path that set the session active and then failed before the
/// turn task took over clears the flag here.
async fn start_turn(state: Arc<AppState>, request: ChatRequest) -> Result<Body, RelayError> {
    if request.session_id.is_empty() {
        return Err(RelayError::MissingField { field: "sessionId" });
    }
    if request.message.is_empty() {
        return Err(RelayError::MissingField { field: "message" });
    }

    let session = state
        .registry
        .get_or_create(&request.session_id, state.api.as_ref())
        .await
        .map_err(|err| RelayError::remote(err.to_string()))?;
    let thread_id = session
        .thread_id()
        .ok_or_else(|| RelayError::remote("thread handle missing after creation"))?
        .to_string();

    match admission::acquire(&session, &thread_id, state.api.as_ref(), &state.admission)
        .await
        .map_err(|err| RelayError::remote(err.to_string()))?
    {
        AdmissionOutcome::Admitted => {}
        AdmissionOutcome::Conflict => return Err(RelayError::AdmissionConflict),
    }

    // Claim the session before touching the thread; a concurrent admitted
    // request loses this race and is told to retry.
    if !session.try_activate() {
        return Err(RelayError::AdmissionConflict);
    }

    if let Err(err) = state
        .api
        .append_user_message(&thread_id, &request.message)
        .await
    {
        session.set_active(false);
        // Admission cannot fully close the append race without a remote
        // mutex; the remote's own rejection is the backstop.
        return Err(match err {
            ClientError::ActiveRun { .. } => RelayError::AdmissionConflict,
            other => RelayError::remote(other.to_string()),
        });
    }

    let stream = match state.api.create_run_stream(&thread_id).await {
        Ok(stream) => stream,
        Err(err) => {
            session.set_active(false);
            return Err(RelayError::remote(err.to_string()));
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(FRAME_CHANNEL_SIZE);
    let sink = Arc::new(FrameSink::new(tx));
    let turn_state = state.clone();
    let turn_config = state.turn.clone();
    tokio::spawn(async move {
        run_turn(
            session,
            &thread_id,
            turn_state.api.as_ref(),
            turn_state.dispatcher.as_ref(),
            sink,
            &turn_config,
            stream,
        )
        .await;
    });

    Ok(Body::from_stream(
        ReceiverStream::new(rx).map(Ok::<_, Infallible>),
    ))
}

fn error_response(err: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_body())).into_response()
}
