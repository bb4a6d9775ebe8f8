use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::form::{self, ConversionForm};
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::job::{ConversionKind, JobState, OutputArtifact};
use crate::services::staging::Job;
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::header,
    response::Response,
};
use futures::Stream;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Multipart body for endpoints taking one or more files.
#[derive(ToSchema)]
pub struct FilesUpload {
    /// Files in the order they should be processed
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

/// Multipart body for the size-targeting endpoints.
#[derive(ToSchema)]
pub struct CompressUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Target size ceiling in kilobytes
    pub size_kb: u64,
}

/// Multipart body for PDF to office conversion.
#[derive(ToSchema)]
pub struct OfficeUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// One of docx, doc, odt, rtf, txt, html, pptx, odp
    pub format: String,
}

#[utoipa::path(
    post,
    path = "/convert/images-to-pdf",
    request_body(content = FilesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "converted.pdf, one page per image"),
        (status = 400, description = "No images uploaded"),
        (status = 422, description = "An image could not be decoded")
    ),
    tag = "convert"
)]
pub async fn images_to_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::ImagesToPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/convert/pdf-to-images",
    request_body(content = FilesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "pdf_images.zip with one PNG per page"),
        (status = 422, description = "Not a readable PDF"),
        (status = 502, description = "Rasterizer failed")
    ),
    tag = "convert"
)]
pub async fn pdf_to_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::PdfToImages, multipart).await
}

#[utoipa::path(
    post,
    path = "/merge",
    request_body(content = FilesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "merged.pdf in upload order"),
        (status = 502, description = "An input is not a valid PDF")
    ),
    tag = "convert"
)]
pub async fn merge_pdfs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::MergePdfs, multipart).await
}

#[utoipa::path(
    post,
    path = "/compress-pdf",
    request_body(content = CompressUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "compressed.pdf"),
        (status = 400, description = "Missing or invalid size_kb"),
        (status = 502, description = "Ghostscript failed")
    ),
    tag = "compress"
)]
pub async fn compress_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::CompressPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/compress-image",
    request_body(content = CompressUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "compressed_image.<ext>, same type as the upload"),
        (status = 400, description = "Missing or invalid size_kb"),
        (status = 422, description = "Not a decodable image")
    ),
    tag = "compress"
)]
pub async fn compress_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::CompressImage, multipart).await
}

#[utoipa::path(
    post,
    path = "/convert/office-to-pdf",
    request_body(content = FilesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "converted.pdf"),
        (status = 415, description = "Not an office document"),
        (status = 502, description = "LibreOffice failed")
    ),
    tag = "convert"
)]
pub async fn office_to_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::OfficeToPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/convert/pdf-to-office",
    request_body(content = OfficeUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "converted.<format>"),
        (status = 415, description = "Format not in the allow-list"),
        (status = 502, description = "LibreOffice failed")
    ),
    tag = "convert"
)]
pub async fn pdf_to_office(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    run_conversion(state, ConversionKind::PdfToOffice, multipart).await
}

/// Drives one request through its job lifecycle. On failure the job is
/// dropped before returning; on success it moves into the response body and
/// its workspace is removed once the body is finished or dropped.
async fn run_conversion(
    state: AppState,
    kind: ConversionKind,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut job = state.service.staging().begin_job(kind)?;

    match process(&state, &mut job, &mut multipart).await {
        Ok(delivery) => {
            info!(
                "✅ Job {} ({}) responding with {} ({} bytes)",
                job.id(),
                kind,
                delivery.artifact.filename,
                delivery.size
            );
            Ok(delivery.into_response(job)?)
        }
        Err(e) => {
            job.fail(&e);
            form::drain(&mut multipart).await;
            Err(e.into())
        }
    }
}

async fn process(
    state: &AppState,
    job: &mut Job,
    multipart: &mut Multipart,
) -> ConvertResult<Delivery> {
    let form = ConversionForm::read(multipart, job).await?;
    job.advance(JobState::Staged)?;

    let request = form.into_request(job.kind())?;
    let artifact = state.service.convert(job, request).await?;
    job.advance(JobState::Converted)?;

    let delivery = Delivery::open(artifact).await?;
    job.advance(JobState::Responded)?;
    Ok(delivery)
}

/// An opened artifact ready to stream back to the client.
struct Delivery {
    artifact: OutputArtifact,
    file: File,
    size: u64,
}

impl Delivery {
    async fn open(artifact: OutputArtifact) -> ConvertResult<Self> {
        let file = File::open(&artifact.path)
            .await
            .map_err(|e| ConvertError::io(&artifact.path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| ConvertError::io(&artifact.path, e))?
            .len();
        Ok(Self {
            artifact,
            file,
            size,
        })
    }

    fn into_response(self, job: Job) -> ConvertResult<Response> {
        let body = Body::from_stream(ArtifactStream {
            inner: ReaderStream::new(self.file),
            job,
        });

        Response::builder()
            .header(header::CONTENT_TYPE, &self.artifact.content_type)
            .header(header::CONTENT_LENGTH, self.size)
            .header(header::CONTENT_DISPOSITION, attachment(&self.artifact.filename))
            .body(body)
            .map_err(|e| ConvertError::Internal(format!("Failed to build response: {}", e)))
    }
}

/// Streams the artifact while owning its job, so the workspace lives exactly
/// as long as the response body.
struct ArtifactStream {
    inner: ReaderStream<File>,
    job: Job,
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        debug!("Job {} body released, removing workspace", self.job.id());
    }
}

fn attachment(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect();
    let fallback = if fallback.is_empty() { "download" } else { &fallback };
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_header() {
        assert_eq!(
            attachment("merged.pdf"),
            "attachment; filename=\"merged.pdf\"; filename*=UTF-8''merged%2Epdf"
        );
        assert!(attachment("a\"b.pdf").starts_with("attachment; filename=\"ab.pdf\""));
        assert!(attachment("ö").contains("filename=\"download\""));
    }
}
