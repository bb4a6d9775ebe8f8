use crate::services::error::{ConvertError, ConvertResult};
use std::fmt;
use std::path::PathBuf;

/// The conversion kinds exposed over HTTP, one per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    ImagesToPdf,
    PdfToImages,
    MergePdfs,
    CompressPdf,
    CompressImage,
    OfficeToPdf,
    PdfToOffice,
}

impl ConversionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionKind::ImagesToPdf => "images-to-pdf",
            ConversionKind::PdfToImages => "pdf-to-images",
            ConversionKind::MergePdfs => "merge",
            ConversionKind::CompressPdf => "compress-pdf",
            ConversionKind::CompressImage => "compress-image",
            ConversionKind::OfficeToPdf => "office-to-pdf",
            ConversionKind::PdfToOffice => "pdf-to-office",
        }
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request lifecycle.
///
/// `Received -> Staged -> Converted -> Responded`, with `Failed` reachable from
/// every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Staged,
    Converted,
    Responded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Responded | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Received, JobState::Staged)
                | (JobState::Staged, JobState::Converted)
                | (JobState::Converted, JobState::Responded)
                | (JobState::Received, JobState::Failed)
                | (JobState::Staged, JobState::Failed)
                | (JobState::Converted, JobState::Failed)
        )
    }

    pub fn transition(self, next: JobState) -> ConvertResult<JobState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ConvertError::Internal(format!(
                "Invalid job transition {:?} -> {:?}",
                self, next
            )))
        }
    }
}

/// The single file a conversion produces, returned as the response body.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub path: PathBuf,
    /// Suggested download filename
    pub filename: String,
    pub content_type: String,
}

impl OutputArtifact {
    pub fn new(
        path: impl Into<PathBuf>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }

    pub fn pdf(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self::new(path, filename, mime::APPLICATION_PDF.as_ref())
    }
}
