pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::ConvertConfig;
use crate::services::conversion::ConversionService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart framing and text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::convert::images_to_pdf,
        api::handlers::convert::pdf_to_images,
        api::handlers::convert::merge_pdfs,
        api::handlers::convert::compress_pdf,
        api::handlers::convert::compress_image,
        api::handlers::convert::office_to_pdf,
        api::handlers::convert::pdf_to_office,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::health::ToolStatus,
            api::handlers::convert::FilesUpload,
            api::handlers::convert::CompressUpload,
            api::handlers::convert::OfficeUpload,
        )
    ),
    tags(
        (name = "convert", description = "Format conversion endpoints"),
        (name = "compress", description = "Size-targeting compression endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversionService>,
    pub config: ConvertConfig,
}

impl AppState {
    pub fn new(service: Arc<ConversionService>) -> Self {
        let config = service.config().clone();
        Self { service, config }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/convert/images-to-pdf",
            post(api::handlers::convert::images_to_pdf),
        )
        .route(
            "/convert/pdf-to-images",
            post(api::handlers::convert::pdf_to_images),
        )
        .route("/merge", post(api::handlers::convert::merge_pdfs))
        .route("/compress-pdf", post(api::handlers::convert::compress_pdf))
        .route("/compress-image", post(api::handlers::convert::compress_image))
        .route(
            "/convert/office-to-pdf",
            post(api::handlers::convert::office_to_pdf),
        )
        .route(
            "/convert/pdf-to-office",
            post(api::handlers::convert::pdf_to_office),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + MULTIPART_OVERHEAD,
        ))
        .with_state(state)
}
