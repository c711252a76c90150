use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use deck_panel::{ConfigError, PanelError, SupervisorError};

/// Error half of every handler result, rendered as
/// `{ "success": false, "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn config_status(err: &ConfigError) -> StatusCode {
    match err {
        ConfigError::NotFound(_) | ConfigError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        ConfigError::DuplicateProvider(_)
        | ConfigError::ChannelExists(_)
        | ConfigError::Corrupt { .. } => StatusCode::CONFLICT,
        ConfigError::InvalidJson(_)
        | ConfigError::Empty
        | ConfigError::InvalidProviderId(_)
        | ConfigError::ModelRequired(_)
        | ConfigError::UnknownModel { .. }
        | ConfigError::Invalid(_) => StatusCode::BAD_REQUEST,
        ConfigError::NoHome
        | ConfigError::Read { .. }
        | ConfigError::Write { .. }
        | ConfigError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn supervisor_status(err: &SupervisorError) -> StatusCode {
    match err {
        SupervisorError::AlreadyRunning | SupervisorError::Cancelled => StatusCode::CONFLICT,
        SupervisorError::Spawn { .. }
        | SupervisorError::Exited { .. }
        | SupervisorError::NotReady(_)
        | SupervisorError::Lost => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PanelError> for ApiError {
    fn from(err: PanelError) -> Self {
        let status = match &err {
            PanelError::Config(e) => config_status(e),
            PanelError::Supervisor(e) => supervisor_status(e),
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        } else {
            warn!(status = %self.status, "{}", self.message);
        }
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_panel_errors_to_status_codes() {
        let cases = [
            (PanelError::from(ConfigError::Empty), StatusCode::BAD_REQUEST),
            (ConfigError::UnknownProvider("x".into()).into(), StatusCode::NOT_FOUND),
            (ConfigError::DuplicateProvider("x".into()).into(), StatusCode::CONFLICT),
            (SupervisorError::AlreadyRunning.into(), StatusCode::CONFLICT),
            (
                SupervisorError::Spawn {
                    program: "openclaw".into(),
                    message: "not found".into(),
                }
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
