//! Prefix management pages.

use super::{
    AppState,
    items::flash_outcome,
    session::AdminSession,
    views::{PrefixRow, PrefixesPage, page},
};
use crate::{core::prefix as prefix_store, errors::Result};
use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    Form,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PrefixForm {
    prefix: String,
    #[serde(default)]
    description: String,
}

pub async fn prefixes_page(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
) -> Result<Html<String>> {
    let prefixes = prefix_store::list_prefixes(state.items.db()).await?;
    page(&PrefixesPage {
        flashes: session.take_flashes().await,
        is_admin: true,
        prefixes: prefixes.into_iter().map(PrefixRow::from).collect(),
    })
}

pub async fn prefixes_submit(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Form(form): Form<PrefixForm>,
) -> Result<Redirect> {
    let outcome = match prefix_store::normalize_prefix(&form.prefix) {
        Ok(tag) => prefix_store::register_prefix(state.items.db(), &tag, form.description.trim())
            .await
            .map(|created| {
                if created {
                    format!("Prefijo {tag} agregado")
                } else {
                    format!("El prefijo {tag} ya existe")
                }
            }),
        Err(e) => Err(e),
    };
    flash_outcome(&session, outcome).await?;
    Ok(Redirect::to("/admin_prefijos"))
}

pub async fn delete_prefix(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let outcome = prefix_store::unregister_prefix(state.items.db(), id)
        .await
        .map(|()| "Prefijo eliminado".to_string());
    flash_outcome(&session, outcome).await?;
    Ok(Redirect::to("/admin_prefijos"))
}
