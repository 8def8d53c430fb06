use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::pipeline::{load_view, UploadPipeline, UploadedImage};
use crate::storage::ObjectStoreGateway;
use crate::templates::{render_index, render_view, view_location};
use crate::AppState;

const IMAGE_FIELD: &str = "image";

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/view", get(view))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn require_storage(state: &AppState) -> Result<&ObjectStoreGateway, AppError> {
    state.storage.as_ref().ok_or(AppError::BucketNotConfigured)
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let storage = require_storage(&state)?;
    let images = storage.list().await;
    Ok(Html(render_index(&images, &state.config.bg_color)))
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let storage = require_storage(&state)?;
    let image = read_image_field(multipart).await?;

    let key = UploadPipeline::new(storage, state.captioner.as_ref(), &state.config.scratch_dir)
        .run(image)
        .await?;

    Ok((StatusCode::FOUND, [(header::LOCATION, view_location(&key))]).into_response())
}

/// Pull the `image` file part out of the form.
///
/// A part without a filename is not a file and is skipped; a file part with
/// an empty filename means nothing was selected.
async fn read_image_field(mut multipart: Multipart) -> Result<UploadedImage, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if filename.is_empty() {
            return Err(AppError::EmptyFilename);
        }
        let data = field.bytes().await?;
        return Ok(UploadedImage { filename, data });
    }
    Err(AppError::MissingFile)
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    filename: Option<String>,
}

async fn view(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Html<String>, AppError> {
    let filename = query
        .filename
        .filter(|f| !f.is_empty())
        .ok_or(AppError::MissingFilename)?;
    let storage = require_storage(&state)?;

    let page = load_view(storage, &filename, state.config.signed_url_ttl).await?;
    Ok(Html(render_view(&page, &state.config.bg_color)))
}
