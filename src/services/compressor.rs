use crate::services::error::{ConvertError, ConvertResult};
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

pub const INITIAL_QUALITY: u8 = 85;
pub const QUALITY_FLOOR: u8 = 10;
pub const QUALITY_STEP: u8 = 5;

/// Size ceiling plus the quality range the iterative search may explore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionTarget {
    pub ceiling_kb: u64,
    pub initial_quality: u8,
    pub floor: u8,
    pub step: u8,
}

impl CompressionTarget {
    pub fn new(ceiling_kb: u64) -> Self {
        Self {
            ceiling_kb,
            initial_quality: INITIAL_QUALITY,
            floor: QUALITY_FLOOR,
            step: QUALITY_STEP,
        }
    }

    pub fn with_quality_range(
        ceiling_kb: u64,
        initial_quality: u8,
        floor: u8,
        step: u8,
    ) -> ConvertResult<Self> {
        if step == 0 || floor == 0 || floor > initial_quality || initial_quality > 100 {
            return Err(ConvertError::BadRequest(format!(
                "Invalid quality range {}..={} step {}",
                floor, initial_quality, step
            )));
        }
        Ok(Self {
            ceiling_kb,
            initial_quality,
            floor,
            step,
        })
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_kb.saturating_mul(1024)
    }

    /// Upper bound on encode passes for this range.
    pub fn max_attempts(&self) -> u32 {
        u32::from((self.initial_quality - self.floor).div_ceil(self.step)) + 1
    }
}

/// Something that can write its input at a given quality and report the size.
pub trait QualityEncoder {
    fn encode(&mut self, quality: u8, output: &Path) -> ConvertResult<u64>;

    /// False when the output does not depend on the quality setting.
    fn honours_quality(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOutcome {
    /// Quality of the file left at the output path
    pub quality: u8,
    pub size: u64,
    pub attempts: u32,
    pub met_target: bool,
    /// Every quality tried, in order
    pub tried: Vec<u8>,
}

/// Linear quality search: encode, stop once under the ceiling or at the floor,
/// otherwise step down and retry. The last encode stays at `output`.
pub fn search_quality<E: QualityEncoder + ?Sized>(
    encoder: &mut E,
    target: &CompressionTarget,
    output: &Path,
) -> ConvertResult<CompressionOutcome> {
    let ceiling = target.ceiling_bytes();
    let mut quality = target.initial_quality;
    let mut tried = Vec::with_capacity(target.max_attempts() as usize);

    loop {
        let size = encoder.encode(quality, output)?;
        tried.push(quality);
        debug!("quality {} -> {} bytes (ceiling {})", quality, size, ceiling);

        let met_target = size <= ceiling;
        if met_target || quality <= target.floor || !encoder.honours_quality() {
            return Ok(CompressionOutcome {
                quality,
                size,
                attempts: tried.len() as u32,
                met_target,
                tried,
            });
        }

        quality = quality.saturating_sub(target.step).max(target.floor);
    }
}

/// Re-encodes a decoded image in a fixed output format.
pub struct ImageQualityEncoder {
    image: DynamicImage,
    format: ImageFormat,
}

impl ImageQualityEncoder {
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        // JPEG has no alpha channel
        let image = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };
        Self { image, format }
    }
}

impl QualityEncoder for ImageQualityEncoder {
    fn encode(&mut self, quality: u8, output: &Path) -> ConvertResult<u64> {
        let output_format = match self.format {
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(quality),
            other => ImageOutputFormat::from(other),
        };
        if let ImageOutputFormat::Unsupported(name) = &output_format {
            return Err(ConvertError::UnsupportedFormat(format!(
                "Cannot re-encode {} images",
                name
            )));
        }

        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, output_format)
            .map_err(|e| {
                ConvertError::Conversion(format!("Failed to encode {:?}: {}", self.format, e))
            })?;

        let bytes = buffer.into_inner();
        std::fs::write(output, &bytes).map_err(|e| ConvertError::io(output, e))?;
        Ok(bytes.len() as u64)
    }

    fn honours_quality(&self) -> bool {
        self.format == ImageFormat::Jpeg
    }
}

/// Decodes `input`, keeping track of the format it was stored in.
pub fn decode_image(input: &Path) -> ConvertResult<(DynamicImage, ImageFormat)> {
    let data = std::fs::read(input).map_err(|e| ConvertError::io(input, e))?;
    let format = ImageFormat::from_path(input)
        .ok()
        .or_else(|| image::guess_format(&data).ok())
        .ok_or_else(|| {
            ConvertError::Decode(format!("Unrecognised image format: {}", file_label(input)))
        })?;

    let image = image::load_from_memory_with_format(&data, format)
        .or_else(|_| image::load_from_memory(&data))
        .map_err(|e| {
            ConvertError::Decode(format!("Cannot decode {}: {}", file_label(input), e))
        })?;
    Ok((image, format))
}

/// Iterative strategy for images: re-encode in the source format at
/// decreasing quality until the file fits `ceiling_kb` or the floor is hit.
/// The ceiling is best effort.
pub fn compress_image(
    input: &Path,
    output: &Path,
    ceiling_kb: u64,
) -> ConvertResult<CompressionOutcome> {
    let (image, format) = decode_image(input)?;
    let mut encoder = ImageQualityEncoder::new(image, format);
    let target = CompressionTarget::new(ceiling_kb);

    let outcome = search_quality(&mut encoder, &target, output)?;
    info!(
        "🗜️  Image compressed to {} bytes at quality {} after {} pass(es) (target met: {})",
        outcome.size, outcome.quality, outcome.attempts, outcome.met_target
    );
    Ok(outcome)
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
