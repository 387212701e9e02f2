use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    AdmissionConflict,
    RemoteApi,
    StreamTransport,
}

impl ErrorType {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::AdmissionConflict => 429,
            Self::RemoteApi => 502,
            Self::StreamTransport => 502,
        }
    }
}

/// Wire body for every non-streaming error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("another run is active for this session, try again later")]
    AdmissionConflict,
    #[error("remote assistants API call failed: {message}")]
    RemoteApi { message: String },
    #[error("assistant event stream failed: {message}")]
    StreamTransport { message: String },
}

impl RelayError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteApi {
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::MissingField { .. } => ErrorType::InvalidRequest,
            Self::AdmissionConflict => ErrorType::AdmissionConflict,
            Self::RemoteApi { .. } => ErrorType::RemoteApi,
            Self::StreamTransport { .. } => ErrorType::StreamTransport,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.error_type().status_code()
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
        }
    }
}
