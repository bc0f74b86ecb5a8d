//! Item pages: public listing and detail, login/logout, and the admin
//! create/edit/delete flows.

use super::{
    AppState, notice,
    session::{AdminSession, CurrentSession, password_matches},
    views::{AdminPage, IndexPage, ItemForm, ItemPage, ItemRow, PrefixRow, page},
};
use crate::{
    core::{item as item_store, item::ItemFields, photos::PhotoUpload, prefix as prefix_store},
    errors::{Error, Result},
};
use axum::{
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct EditQuery {
    id: Option<i64>,
}

/// Parsed multipart body of the admin form.
#[derive(Debug, Default)]
struct AdminForm {
    id: Option<i64>,
    prefix: String,
    details: ItemFields,
    photo: Option<PhotoUpload>,
}

fn rows(state: &AppState, items: &[crate::entities::item::Model]) -> Vec<ItemRow> {
    let placeholder = state.items.placeholder();
    items.iter().map(|i| ItemRow::new(i, placeholder)).collect()
}

pub async fn index(State(state): State<AppState>, session: CurrentSession) -> Result<Html<String>> {
    let items = item_store::get_all_items(state.items.db()).await?;
    page(&IndexPage {
        flashes: session.take_flashes().await,
        is_admin: session.is_admin().await,
        items: rows(&state, &items),
    })
}

pub async fn item_detail(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(code): Path<String>,
) -> Result<Html<String>> {
    let item = item_store::get_item_by_code(state.items.db(), &code)
        .await?
        .ok_or_else(|| Error::item_not_found(&code))?;
    page(&ItemPage {
        flashes: session.take_flashes().await,
        is_admin: session.is_admin().await,
        item: ItemRow::new(&item, state.items.placeholder()),
    })
}

pub async fn login(
    State(state): State<AppState>,
    session: CurrentSession,
    Form(form): Form<LoginForm>,
) -> Response {
    if password_matches(&form.password, &state.config.admin_password) {
        session.promote().await;
        return Redirect::to("/admin").into_response();
    }
    warn!("Rejected admin login");
    session.flash("Contraseña incorrecta").await;
    Redirect::to("/").into_response()
}

pub async fn logout(session: CurrentSession) -> Redirect {
    session.logout().await;
    session.flash("Sesión cerrada").await;
    Redirect::to("/")
}

pub async fn admin_page(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Query(query): Query<EditQuery>,
) -> Result<Html<String>> {
    let db = state.items.db();
    let form = match query.id {
        Some(id) => match item_store::get_item_by_id(db, id).await? {
            Some(item) => Some(ItemForm::from(&item)),
            None => {
                session.flash("Artículo no encontrado").await;
                None
            }
        },
        None => None,
    };

    let items = item_store::get_all_items(db).await?;
    let prefixes = prefix_store::list_prefixes(db).await?;
    page(&AdminPage {
        flashes: session.take_flashes().await,
        is_admin: true,
        editing: form.is_some(),
        form: form.unwrap_or_default(),
        prefixes: prefixes.into_iter().map(PrefixRow::from).collect(),
        items: rows(&state, &items),
    })
}

fn bad_upload(e: MultipartError) -> Error {
    Error::validation(format!("Upload rejected: {e}"))
}

async fn read_admin_form(mut multipart: Multipart) -> Result<AdminForm> {
    let mut form = AdminForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "photo" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(bad_upload)?;
            // browsers send an empty part when no file was chosen
            if !file_name.is_empty() && !bytes.is_empty() {
                form.photo = Some(PhotoUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field.text().await.map_err(bad_upload)?;
        match name.as_str() {
            "id" if !value.trim().is_empty() => {
                let id = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::validation(format!("Invalid item id '{value}'")))?;
                form.id = Some(id);
            }
            "prefix" => form.prefix = value,
            "description" => form.details.description = value,
            "identifier" => form.details.identifier = Some(value),
            "owner" => form.details.owner = value,
            "department" => form.details.department = value,
            "notes" => form.details.notes = Some(value),
            other => debug!(field = other, "Ignoring form field"),
        }
    }
    Ok(form)
}

/// Creates an item, or updates one when the form carries an id.
pub async fn admin_submit(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    multipart: Multipart,
) -> Result<Redirect> {
    let outcome = match read_admin_form(multipart).await {
        Ok(form) => match form.id {
            Some(id) => state
                .items
                .update_item(id, form.details, form.photo)
                .await
                .map(|item| format!("Artículo {} actualizado", item.code)),
            None => state
                .items
                .create_item(&form.prefix, form.details, form.photo)
                .await
                .map(|item| format!("Artículo {} creado", item.code)),
        },
        Err(e) => Err(e),
    };
    flash_outcome(&session, outcome).await?;
    Ok(Redirect::to("/admin"))
}

pub async fn delete_item(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let outcome = state
        .items
        .delete_item(id)
        .await
        .map(|item| format!("Artículo {} eliminado", item.code));
    flash_outcome(&session, outcome).await?;
    Ok(Redirect::to("/admin"))
}

pub async fn delete_image(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let outcome = state
        .items
        .clear_photo(id)
        .await
        .map(|item| format!("Foto de {} eliminada", item.code));
    flash_outcome(&session, outcome).await?;
    Ok(Redirect::to("/admin"))
}

/// Queues the success message, or the notice for a rejected request.
/// Server-side failures are passed on.
pub(super) async fn flash_outcome(session: &CurrentSession, outcome: Result<String>) -> Result<()> {
    match outcome {
        Ok(message) => session.flash(message).await,
        Err(e) if super::status_of(&e).is_client_error() => session.flash(notice(&e)).await,
        Err(e) => return Err(e),
    }
    Ok(())
}
