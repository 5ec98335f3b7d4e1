use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use multer::Multipart;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::api::SplitError;
use crate::archive::ARCHIVE_FILENAME;
use crate::pipeline::{self, UploadJob};
use crate::progress::JobProgress;
use crate::router;

/// `POST /upload`: multipart ingest. The field named `file` is processed as
/// a stream of byte chunks, never buffered whole, and the response body is
/// the assembled archive streamed from its staging file.
#[instrument(skip_all, fields(job))]
pub async fn upload(
    State(state): State<router::State>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, SplitError> {
    let boundary = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(SplitError::EmptyUpload)?;

    // Declared length of the whole request; close enough for the upload
    // percentage, which is forced to 100 once ingest completes anyway.
    let declared_bytes = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let mut multipart = Multipart::new(body.into_data_stream(), boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SplitError::Upload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let job = UploadJob::new(
            declared_bytes,
            state.estimated_line_bytes,
            state.line_buffer,
            JobProgress::new(state.progress.clone()),
        );
        tracing::Span::current().record("job", job.id.to_string().as_str());

        let chunks = field.map_err(|e| SplitError::Upload(e.to_string()));
        let archive = pipeline::run(chunks, job).await?;

        let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(archive)));
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{ARCHIVE_FILENAME}\""),
                ),
            ],
            body,
        )
            .into_response());
    }

    Err(SplitError::EmptyUpload)
}
