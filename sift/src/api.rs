use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Every failure is fatal to its job: no partial archive is ever returned,
/// and progress events already broadcast are not retracted.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("request holds no file payload")]
    EmptyUpload,
    #[error("failed to read upload: {0}")]
    Upload(String),
    #[error("column {0:?} not present in header row")]
    Schema(String),
    #[error("partition sink failed: {0}")]
    Sink(String),
    #[error("archive assembly failed: {0}")]
    Assembly(String),
}

impl From<zip::result::ZipError> for SplitError {
    fn from(e: zip::result::ZipError) -> Self {
        SplitError::Assembly(e.to_string())
    }
}

impl IntoResponse for SplitError {
    fn into_response(self) -> Response {
        match self {
            SplitError::EmptyUpload | SplitError::Upload(_) | SplitError::Schema(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            SplitError::Sink(_) | SplitError::Assembly(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}
