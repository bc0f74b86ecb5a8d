//! Document downloads: the tagged-code PNG and the custody receipt PDF.
//!
//! Rendering is CPU-bound and the receipt reads the photo from disk, so both
//! run on the blocking pool.

use super::AppState;
use crate::{
    core::item as item_store,
    entities::item,
    errors::{Error, Result},
    render,
};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::info;

async fn find_item(state: &AppState, code: &str) -> Result<item::Model> {
    item_store::get_item_by_code(state.items.db(), code)
        .await?
        .ok_or_else(|| Error::item_not_found(code))
}

async fn blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| Error::Render {
            message: format!("render task failed: {e}"),
        })?
}

pub async fn tagged_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response> {
    let item = find_item(&state, &code).await?;
    let code = item.code.clone();
    let png = blocking(move || render::render_tagged_code(&item)).await?;

    info!(%code, size = png.len(), "Served tagged code");
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{code}.png\""),
            ),
        ],
        png,
    )
        .into_response())
}

pub async fn custody_receipt(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response> {
    let item = find_item(&state, &code).await?;
    let code = item.code.clone();
    let photo = state.items.photo_path(&item);
    let receipt = state.config.receipt.clone();
    let pdf = blocking(move || {
        render::render_custody_receipt(&item, &receipt, photo.as_deref())
    })
    .await?;

    info!(%code, size = pdf.len(), "Served custody receipt");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"Responsiva_{code}.pdf\""),
            ),
        ],
        pdf,
    )
        .into_response())
}
