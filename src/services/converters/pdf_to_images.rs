use crate::services::compressor::file_label;
use crate::services::converters::pdf_page_count;
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::process::{ToolCommand, ensure_output, run_tool};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Output prefix handed to pdftoppm; it appends `-<n>.png`.
const PAGE_PREFIX: &str = "page";

#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub program: String,
    pub dpi: u32,
    pub timeout: Duration,
}

/// Rasterizes every page of `input` into `pages_dir` and packages the images,
/// in page order, into the ZIP at `archive`. Returns the page count.
pub async fn pdf_to_images(
    input: &Path,
    pages_dir: &Path,
    archive: &Path,
    options: &RasterOptions,
) -> ConvertResult<usize> {
    let source = input.to_path_buf();
    let expected = tokio::task::spawn_blocking(move || pdf_page_count(&source))
        .await?
        .map_err(|e| ConvertError::Decode(format!("Cannot read {}: {}", file_label(input), e)))?;
    if expected == 0 {
        return Err(ConvertError::Decode(format!(
            "{} has no pages",
            file_label(input)
        )));
    }

    let command = ToolCommand::new(&options.program)
        .arg("-r")
        .arg(options.dpi.to_string())
        .arg("-png")
        .arg(input)
        .arg(pages_dir.join(PAGE_PREFIX));
    run_tool(&command, options.timeout).await?;

    let pages = collect_pages(pages_dir).await?;
    if pages.len() != expected {
        return Err(ConvertError::Conversion(format!(
            "Expected {} page images, rasterizer produced {}",
            expected,
            pages.len()
        )));
    }
    for (_, path) in &pages {
        ensure_output(path).await?;
    }

    let target = archive.to_path_buf();
    tokio::task::spawn_blocking(move || package_pages(&pages, &target)).await??;
    ensure_output(archive).await?;

    info!("🖼️  Rasterized {} pages into {}", expected, file_label(archive));
    Ok(expected)
}

/// Page images in `dir`, sorted by page number (numerically).
pub async fn collect_pages(dir: &Path) -> ConvertResult<Vec<(u32, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConvertError::io(dir, e))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConvertError::io(dir, e))?
    {
        let name = entry.file_name();
        if let Some(number) = name.to_str().and_then(parse_page_number) {
            pages.push((number, entry.path()));
        }
    }

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages)
}

/// `page-7.png` and `page-07.png` both map to 7.
fn parse_page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// Writes the images into a ZIP, named `page-<n>.png` with the page number
/// zero-padded so lexical order equals page order.
pub fn package_pages(pages: &[(u32, PathBuf)], archive: &Path) -> ConvertResult<()> {
    let file = File::create(archive).map_err(|e| ConvertError::io(archive, e))?;
    let mut zip = zip::ZipWriter::new(file);
    // PNG data is already deflated
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let width = pages
        .iter()
        .map(|(number, _)| *number)
        .max()
        .unwrap_or(1)
        .to_string()
        .len();

    for (number, path) in pages {
        let entry_name = format!("{}-{:0width$}.png", PAGE_PREFIX, number, width = width);
        zip.start_file(entry_name, options)
            .map_err(|e| ConvertError::Conversion(format!("Failed to add page {}: {}", number, e)))?;
        let mut image = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        std::io::copy(&mut image, &mut zip).map_err(|e| ConvertError::io(archive, e))?;
    }

    zip.finish()
        .map_err(|e| ConvertError::Conversion(format!("Failed to finish archive: {}", e)))?;
    Ok(())
}
