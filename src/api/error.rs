use crate::services::error::ConvertError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Convert(e) => match e {
                ConvertError::Upload(_) | ConvertError::BadRequest(_) => StatusCode::BAD_REQUEST,
                ConvertError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                ConvertError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ConvertError::Conversion(_) => StatusCode::BAD_GATEWAY,
                ConvertError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ConvertError::Io { .. } | ConvertError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Convert(e) => e.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {:?}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": code
        }));

        (status, body).into_response()
    }
}
