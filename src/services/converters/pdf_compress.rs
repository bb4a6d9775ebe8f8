use crate::services::error::ConvertResult;
use crate::services::process::{ToolCommand, ensure_output, run_tool};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Ghostscript quality preset used for every PDF compression.
pub const PDF_PRESET: &str = "/ebook";

#[derive(Debug, Clone)]
pub struct PdfCompressOptions {
    pub program: String,
    pub timeout: Duration,
}

/// Fixed-preset strategy for PDFs: a single Ghostscript `pdfwrite` pass.
///
/// Unlike the image path there is no search; `ceiling_kb` is only compared
/// against the result for logging. Returns the output size in bytes.
pub async fn compress_pdf(
    input: &Path,
    output: &Path,
    ceiling_kb: u64,
    options: &PdfCompressOptions,
) -> ConvertResult<u64> {
    let command = ToolCommand::new(&options.program)
        .arg("-sDEVICE=pdfwrite")
        .arg("-dCompatibilityLevel=1.4")
        .arg(format!("-dPDFSETTINGS={}", PDF_PRESET))
        .arg("-dNOPAUSE")
        .arg("-dQUIET")
        .arg("-dBATCH")
        .arg("-dSAFER")
        .arg(format!("-sOutputFile={}", output.display()))
        .arg(input);
    run_tool(&command, options.timeout).await?;

    let size = ensure_output(output).await?;
    let ceiling = ceiling_kb.saturating_mul(1024);
    if size > ceiling {
        warn!(
            "PDF compressed to {} bytes, above the requested {} KB ({} preset is fixed)",
            size, ceiling_kb, PDF_PRESET
        );
    } else {
        info!("🗜️  PDF compressed to {} bytes (target {} KB)", size, ceiling_kb);
    }
    Ok(size)
}
