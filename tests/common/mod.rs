#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use file_convert_backend::config::ConvertConfig;
use file_convert_backend::services::conversion::ConversionService;
use file_convert_backend::{AppState, create_app};
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

pub struct TestApp {
    pub app: Router,
    pub staging_root: PathBuf,
    _base: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ConvertConfig)) -> Self {
        let base = tempfile::tempdir().unwrap();
        let mut config = ConvertConfig::with_base_dir(base.path());
        adjust(&mut config);

        let service = Arc::new(ConversionService::new(config).unwrap());
        let staging_root = service.staging().root().to_path_buf();
        Self {
            app: create_app(AppState::new(service)),
            staging_root,
            _base: base,
        }
    }

    pub async fn post(&self, uri: &str, parts: &[Part]) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(multipart_body(parts)))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Job workspaces left behind under the staging root.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.staging_root).unwrap().count()
    }
}

pub enum Part {
    File {
        field: &'static str,
        filename: String,
        content_type: &'static str,
        data: Vec<u8>,
    },
    Text {
        field: &'static str,
        value: String,
    },
}

impl Part {
    pub fn file(filename: &str, content_type: &'static str, data: Vec<u8>) -> Self {
        Part::File {
            field: "files",
            filename: filename.to_string(),
            content_type,
            data,
        }
    }

    pub fn text(field: &'static str, value: &str) -> Self {
        Part::Text {
            field,
            value: value.to_string(),
        }
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                field,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        field, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { field, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// A PNG whose width identifies it once it becomes a PDF page.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// A PDF with one page per width, built through the image pipeline.
pub fn pdf_bytes(dir: &Path, name: &str, widths: &[u32]) -> Vec<u8> {
    let inputs: Vec<PathBuf> = widths
        .iter()
        .enumerate()
        .map(|(i, width)| {
            let path = dir.join(format!("{}-{}.png", name, i));
            std::fs::write(&path, png_bytes(*width, 5)).unwrap();
            path
        })
        .collect();
    let output = dir.join(format!("{}.pdf", name));
    file_convert_backend::services::converters::images_to_pdf(&inputs, &output).unwrap();
    std::fs::read(output).unwrap()
}

/// Page widths of a PDF, in page order.
pub fn page_widths(pdf: &[u8]) -> Vec<i64> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}
