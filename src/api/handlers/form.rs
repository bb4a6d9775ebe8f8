use crate::services::conversion::ConversionRequest;
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::job::ConversionKind;
use crate::services::staging::{Job, StagedFile};
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Multipart fields a conversion endpoint understands. Uploads are staged
/// into the job workspace as they arrive, in submission order.
#[derive(Debug, Default)]
pub struct ConversionForm {
    pub files: Vec<StagedFile>,
    pub size_kb: Option<String>,
    pub format: Option<String>,
}

impl ConversionForm {
    pub async fn read(multipart: &mut Multipart, job: &Job) -> ConvertResult<Self> {
        let mut form = ConversionForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "files" | "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let body_with_io_error = field.map_err(std::io::Error::other);
                    let reader = StreamReader::new(body_with_io_error);
                    form.files.push(job.stage_reader(reader, &filename).await?);
                }
                "size_kb" => form.size_kb = Some(text(field).await?),
                "format" => form.format = Some(text(field).await?),
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }

        Ok(form)
    }

    /// Validates the collected fields against what `kind` needs.
    pub fn into_request(self, kind: ConversionKind) -> ConvertResult<ConversionRequest> {
        let request = match kind {
            ConversionKind::ImagesToPdf => ConversionRequest::ImagesToPdf {
                images: self.require_files()?,
            },
            ConversionKind::MergePdfs => ConversionRequest::MergePdfs {
                pdfs: self.require_files()?,
            },
            ConversionKind::PdfToImages => ConversionRequest::PdfToImages {
                pdf: self.single_file()?,
            },
            ConversionKind::OfficeToPdf => ConversionRequest::OfficeToPdf {
                document: self.single_file()?,
            },
            ConversionKind::CompressPdf => {
                let size_kb = self.size_kb()?;
                ConversionRequest::CompressPdf {
                    pdf: self.single_file()?,
                    size_kb,
                }
            }
            ConversionKind::CompressImage => {
                let size_kb = self.size_kb()?;
                ConversionRequest::CompressImage {
                    image: self.single_file()?,
                    size_kb,
                }
            }
            ConversionKind::PdfToOffice => {
                let format = self
                    .format
                    .as_deref()
                    .ok_or_else(|| ConvertError::BadRequest("Missing 'format' field".to_string()))?
                    .parse()?;
                ConversionRequest::PdfToOffice {
                    pdf: self.single_file()?,
                    format,
                }
            }
        };
        Ok(request)
    }

    fn size_kb(&self) -> ConvertResult<u64> {
        let raw = self
            .size_kb
            .as_deref()
            .ok_or_else(|| ConvertError::BadRequest("Missing 'size_kb' field".to_string()))?;
        match raw.trim().parse::<u64>() {
            Ok(size) if size > 0 => Ok(size),
            _ => Err(ConvertError::BadRequest(format!(
                "'size_kb' must be a positive integer, got '{}'",
                raw
            ))),
        }
    }

    fn require_files(self) -> ConvertResult<Vec<StagedFile>> {
        if self.files.is_empty() {
            return Err(ConvertError::BadRequest("No files uploaded".to_string()));
        }
        Ok(self.files)
    }

    fn single_file(self) -> ConvertResult<StagedFile> {
        let mut files = self.files;
        match files.len() {
            1 => Ok(files.remove(0)),
            0 => Err(ConvertError::BadRequest("No file uploaded".to_string())),
            n => Err(ConvertError::BadRequest(format!(
                "Expected exactly one file, got {}",
                n
            ))),
        }
    }
}

async fn text(field: axum::extract::multipart::Field<'_>) -> ConvertResult<String> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(e: MultipartError) -> ConvertError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ConvertError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        ConvertError::BadRequest(e.body_text())
    }
}

/// Drains whatever is left of a rejected upload so the client sees the
/// error response instead of a reset connection.
pub async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::services::staging::Staging;

    async fn form_with(
        files: &[&str],
        size_kb: Option<&str>,
        format: Option<&str>,
    ) -> (ConversionForm, Job, tempfile::TempDir) {
        let base = tempfile::tempdir().unwrap();
        let staging = Staging::new(&ConvertConfig::with_base_dir(base.path())).unwrap();
        let job = staging.begin_job(ConversionKind::CompressPdf).unwrap();
        let mut staged = Vec::new();
        for name in files {
            staged.push(job.stage(b"%PDF-1.4", name).await.unwrap());
        }
        (
            ConversionForm {
                files: staged,
                size_kb: size_kb.map(str::to_string),
                format: format.map(str::to_string),
            },
            job,
            base,
        )
    }

    #[tokio::test]
    async fn test_missing_size_kb() {
        let (form, _job, _base) = form_with(&["a.pdf"], None, None).await;
        let err = form.into_request(ConversionKind::CompressPdf).unwrap_err();
        assert!(matches!(err, ConvertError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_size_kb_must_be_positive() {
        for raw in ["0", "-5", "abc", ""] {
            let (form, _job, _base) = form_with(&["a.pdf"], Some(raw), None).await;
            let err = form.into_request(ConversionKind::CompressImage).unwrap_err();
            assert!(matches!(err, ConvertError::BadRequest(_)), "{}", raw);
        }

        let (form, _job, _base) = form_with(&["a.pdf"], Some(" 250 "), None).await;
        match form.into_request(ConversionKind::CompressPdf).unwrap() {
            ConversionRequest::CompressPdf { size_kb, .. } => assert_eq!(size_kb, 250),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_file_endpoints_reject_many() {
        let (form, _job, _base) = form_with(&["a.pdf", "b.pdf"], None, None).await;
        let err = form.into_request(ConversionKind::PdfToImages).unwrap_err();
        assert!(matches!(err, ConvertError::BadRequest(_)));

        let (form, _job, _base) = form_with(&[], None, None).await;
        assert!(form.into_request(ConversionKind::MergePdfs).is_err());
    }

    #[tokio::test]
    async fn test_format_is_parsed_before_conversion() {
        let (form, _job, _base) = form_with(&["a.pdf"], None, Some("exe")).await;
        let err = form.into_request(ConversionKind::PdfToOffice).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));

        let (form, _job, _base) = form_with(&["a.pdf"], None, None).await;
        let err = form.into_request(ConversionKind::PdfToOffice).unwrap_err();
        assert!(matches!(err, ConvertError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_multi_file_order_is_kept() {
        let (form, _job, _base) = form_with(&["one.pdf", "two.pdf", "three.pdf"], None, None).await;
        match form.into_request(ConversionKind::MergePdfs).unwrap() {
            ConversionRequest::MergePdfs { pdfs } => {
                let names: Vec<_> = pdfs.iter().map(|f| f.original_name.as_str()).collect();
                assert_eq!(names, ["one.pdf", "two.pdf", "three.pdf"]);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }
}
