use crate::config::ConvertConfig;
use crate::services::compressor;
use crate::services::converters::{
    self, OfficeFormat, office::OfficeOptions, pdf_compress::PdfCompressOptions,
    pdf_to_images::RasterOptions, sniff_content_type,
};
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::job::{ConversionKind, OutputArtifact};
use crate::services::staging::{Job, StagedFile, Staging};
use std::path::PathBuf;
use tracing::info;

/// A fully validated conversion request: staged inputs plus typed parameters.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    ImagesToPdf { images: Vec<StagedFile> },
    PdfToImages { pdf: StagedFile },
    MergePdfs { pdfs: Vec<StagedFile> },
    CompressPdf { pdf: StagedFile, size_kb: u64 },
    CompressImage { image: StagedFile, size_kb: u64 },
    OfficeToPdf { document: StagedFile },
    PdfToOffice { pdf: StagedFile, format: OfficeFormat },
}

impl ConversionRequest {
    pub fn kind(&self) -> ConversionKind {
        match self {
            ConversionRequest::ImagesToPdf { .. } => ConversionKind::ImagesToPdf,
            ConversionRequest::PdfToImages { .. } => ConversionKind::PdfToImages,
            ConversionRequest::MergePdfs { .. } => ConversionKind::MergePdfs,
            ConversionRequest::CompressPdf { .. } => ConversionKind::CompressPdf,
            ConversionRequest::CompressImage { .. } => ConversionKind::CompressImage,
            ConversionRequest::OfficeToPdf { .. } => ConversionKind::OfficeToPdf,
            ConversionRequest::PdfToOffice { .. } => ConversionKind::PdfToOffice,
        }
    }
}

/// Runs conversions inside a job's workspace. Holds the configuration and
/// the staging root; cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ConversionService {
    config: ConvertConfig,
    staging: Staging,
}

impl ConversionService {
    pub fn new(config: ConvertConfig) -> ConvertResult<Self> {
        let staging = Staging::new(&config)?;
        Ok(Self { config, staging })
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    pub async fn convert(&self, job: &Job, request: ConversionRequest) -> ConvertResult<OutputArtifact> {
        if request.kind() != job.kind() {
            return Err(ConvertError::Internal(format!(
                "{} request submitted to a {} job",
                request.kind(),
                job.kind()
            )));
        }

        match request {
            ConversionRequest::ImagesToPdf { images } => self.images_to_pdf(job, &images).await,
            ConversionRequest::PdfToImages { pdf } => self.pdf_to_images(job, &pdf).await,
            ConversionRequest::MergePdfs { pdfs } => self.merge_pdfs(job, &pdfs).await,
            ConversionRequest::CompressPdf { pdf, size_kb } => {
                self.compress_pdf(job, &pdf, size_kb).await
            }
            ConversionRequest::CompressImage { image, size_kb } => {
                self.compress_image(job, &image, size_kb).await
            }
            ConversionRequest::OfficeToPdf { document } => self.office_to_pdf(job, &document).await,
            ConversionRequest::PdfToOffice { pdf, format } => {
                self.pdf_to_office(job, &pdf, format).await
            }
        }
    }

    pub async fn images_to_pdf(
        &self,
        job: &Job,
        images: &[StagedFile],
    ) -> ConvertResult<OutputArtifact> {
        let inputs = paths_of(images);
        let output = job.output_path("pdf");
        let target = output.clone();
        let pages =
            tokio::task::spawn_blocking(move || converters::images_to_pdf(&inputs, &target))
                .await??;

        info!("🖼️  Job {}: {} images -> {} page PDF", job.id(), images.len(), pages);
        Ok(OutputArtifact::pdf(output, "converted.pdf"))
    }

    pub async fn pdf_to_images(&self, job: &Job, pdf: &StagedFile) -> ConvertResult<OutputArtifact> {
        let pages_dir = job.output_dir("pages").await?;
        let archive = job.output_path("zip");
        let options = RasterOptions {
            program: self.config.pdftoppm_bin.clone(),
            dpi: self.config.raster_dpi,
            timeout: self.config.process_timeout(),
        };
        converters::pdf_to_images(&pdf.path, &pages_dir, &archive, &options).await?;

        Ok(OutputArtifact::new(archive, "pdf_images.zip", "application/zip"))
    }

    pub async fn merge_pdfs(&self, job: &Job, pdfs: &[StagedFile]) -> ConvertResult<OutputArtifact> {
        let inputs = paths_of(pdfs);
        let output = job.output_path("pdf");
        let target = output.clone();
        let pages = tokio::task::spawn_blocking(move || converters::merge_pdfs(&inputs, &target))
            .await??;

        info!("📎 Job {}: merged {} PDFs ({} pages)", job.id(), pdfs.len(), pages);
        Ok(OutputArtifact::pdf(output, "merged.pdf"))
    }

    pub async fn compress_pdf(
        &self,
        job: &Job,
        pdf: &StagedFile,
        size_kb: u64,
    ) -> ConvertResult<OutputArtifact> {
        let output = job.output_path("pdf");
        let options = PdfCompressOptions {
            program: self.config.ghostscript_bin.clone(),
            timeout: self.config.process_timeout(),
        };
        converters::compress_pdf(&pdf.path, &output, size_kb, &options).await?;

        Ok(OutputArtifact::pdf(output, "compressed.pdf"))
    }

    /// Output keeps the uploaded image's type; the filename keeps its extension.
    pub async fn compress_image(
        &self,
        job: &Job,
        image: &StagedFile,
        size_kb: u64,
    ) -> ConvertResult<OutputArtifact> {
        let extension = image
            .extension()
            .or_else(|| {
                infer::get_from_path(&image.path)
                    .ok()
                    .flatten()
                    .map(|kind| kind.extension().to_string())
            })
            .ok_or_else(|| {
                ConvertError::Decode(format!("Unrecognised image type: {}", image.original_name))
            })?;

        let output = job.output_path(&extension);
        let input = image.path.clone();
        let target = output.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            compressor::compress_image(&input, &target, size_kb)
        })
        .await??;

        if !outcome.met_target {
            info!(
                "Job {}: best effort {} bytes at quality {} (target {} KB)",
                job.id(),
                outcome.size,
                outcome.quality,
                size_kb
            );
        }

        let content_type = sniff_content_type(&output);
        Ok(OutputArtifact::new(
            output,
            format!("compressed_image.{}", extension),
            content_type,
        ))
    }

    pub async fn office_to_pdf(
        &self,
        job: &Job,
        document: &StagedFile,
    ) -> ConvertResult<OutputArtifact> {
        let out_dir = job.output_dir("office").await?;
        let profile = job.workspace().join("lo-profile");
        let produced = converters::office_to_pdf(
            &document.path,
            &document.original_name,
            &out_dir,
            &profile,
            &self.office_options(),
        )
        .await?;

        Ok(OutputArtifact::pdf(produced, "converted.pdf"))
    }

    pub async fn pdf_to_office(
        &self,
        job: &Job,
        pdf: &StagedFile,
        format: OfficeFormat,
    ) -> ConvertResult<OutputArtifact> {
        let out_dir = job.output_dir("office").await?;
        let profile = job.workspace().join("lo-profile");
        let produced = converters::pdf_to_office(
            &pdf.path,
            format,
            &out_dir,
            &profile,
            &self.office_options(),
        )
        .await?;

        Ok(OutputArtifact::new(
            produced,
            format!("converted.{}", format.extension()),
            format.content_type(),
        ))
    }

    fn office_options(&self) -> OfficeOptions {
        OfficeOptions {
            program: self.config.libreoffice_bin.clone(),
            timeout: self.config.process_timeout(),
        }
    }
}

fn paths_of(files: &[StagedFile]) -> Vec<PathBuf> {
    files.iter().map(|file| file.path.clone()).collect()
}
