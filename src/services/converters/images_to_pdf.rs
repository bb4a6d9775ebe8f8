use crate::services::compressor::{decode_image, file_label};
use crate::services::error::{ConvertError, ConvertResult};
use image::{DynamicImage, ImageOutputFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;

/// JPEG quality used for embedded page images.
const EMBED_QUALITY: u8 = 92;

struct PageImage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

/// Builds one PDF with a page per image, in input order.
///
/// All images are decoded before the output is written, so an unreadable image
/// fails the whole conversion with `Decode` and leaves no output behind.
pub fn images_to_pdf(inputs: &[PathBuf], output: &Path) -> ConvertResult<usize> {
    if inputs.is_empty() {
        return Err(ConvertError::BadRequest(
            "At least one image is required".to_string(),
        ));
    }

    let pages = inputs
        .iter()
        .map(|path| load_page_image(path))
        .collect::<ConvertResult<Vec<_>>>()?;

    let mut doc = build_document(pages)?;
    doc.save(output).map_err(|e| {
        ConvertError::Conversion(format!("Failed to write {}: {}", file_label(output), e))
    })?;

    info!("📄 Built {}-page PDF from images", inputs.len());
    Ok(inputs.len())
}

fn load_page_image(path: &Path) -> ConvertResult<PageImage> {
    let (image, _) = decode_image(path)?;

    // Normalise palette, alpha and 16-bit sources to 8-bit RGB
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut jpeg = Cursor::new(Vec::new());
    rgb.write_to(&mut jpeg, ImageOutputFormat::Jpeg(EMBED_QUALITY))
        .map_err(|e| {
            ConvertError::Conversion(format!("Cannot re-encode {}: {}", file_label(path), e))
        })?;

    Ok(PageImage {
        width: rgb.width(),
        height: rgb.height(),
        jpeg: jpeg.into_inner(),
    })
}

fn build_document(pages: Vec<PageImage>) -> ConvertResult<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let count = pages.len() as i64;

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let page_id = add_image_page(&mut doc, pages_id, page)?;
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    Ok(doc)
}

/// Page size in points equals the pixel size (72 dpi).
fn add_image_page(doc: &mut Document, parent: ObjectId, page: PageImage) -> ConvertResult<ObjectId> {
    let width = i64::from(page.width);
    let height = i64::from(page.height);

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        page.jpeg,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| ConvertError::Conversion(format!("Failed to encode page content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let media_box: Vec<Object> = vec![0.into(), 0.into(), width.into(), height.into()];
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "MediaBox" => media_box,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}
