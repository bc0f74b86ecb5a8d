//! Page templates and the row types they display.

use crate::entities::{item, prefix};
use askama::Template;
use axum::response::Html;

/// Public item list with the login form.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage {
    pub flashes: Vec<String>,
    pub is_admin: bool,
    pub items: Vec<ItemRow>,
}

/// One item in detail.
#[derive(Template)]
#[template(path = "item.html")]
pub struct ItemPage {
    pub flashes: Vec<String>,
    pub is_admin: bool,
    pub item: ItemRow,
}

/// Item management: the create/edit form and the item table.
#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminPage {
    pub flashes: Vec<String>,
    pub is_admin: bool,
    pub editing: bool,
    pub form: ItemForm,
    pub prefixes: Vec<PrefixRow>,
    pub items: Vec<ItemRow>,
}

/// Prefix management.
#[derive(Template)]
#[template(path = "admin_prefixes.html")]
pub struct PrefixesPage {
    pub flashes: Vec<String>,
    pub is_admin: bool,
    pub prefixes: Vec<PrefixRow>,
}

/// An item flattened for display.
pub struct ItemRow {
    pub id: i64,
    pub code: String,
    pub description: String,
    pub identifier: String,
    pub owner: String,
    pub department: String,
    pub notes: String,
    pub photo_url: String,
    pub has_photo: bool,
}

impl ItemRow {
    pub fn new(item: &item::Model, placeholder: &str) -> Self {
        Self {
            id: item.id,
            code: item.code.clone(),
            description: item.description.clone(),
            identifier: item.identifier.clone().unwrap_or_default(),
            owner: item.owner.clone(),
            department: item.department.clone(),
            notes: item.notes.clone().unwrap_or_default(),
            photo_url: format!("/static/images/{}", item.photo),
            has_photo: item.photo != placeholder,
        }
    }
}

/// Values pre-filled into the admin form.
#[derive(Default)]
pub struct ItemForm {
    pub id: String,
    pub code: String,
    pub description: String,
    pub identifier: String,
    pub owner: String,
    pub department: String,
    pub notes: String,
}

impl From<&item::Model> for ItemForm {
    fn from(item: &item::Model) -> Self {
        Self {
            id: item.id.to_string(),
            code: item.code.clone(),
            description: item.description.clone(),
            identifier: item.identifier.clone().unwrap_or_default(),
            owner: item.owner.clone(),
            department: item.department.clone(),
            notes: item.notes.clone().unwrap_or_default(),
        }
    }
}

pub struct PrefixRow {
    pub id: i64,
    pub prefix: String,
    pub description: String,
}

impl From<prefix::Model> for PrefixRow {
    fn from(model: prefix::Model) -> Self {
        Self {
            id: model.id,
            prefix: model.prefix,
            description: model.description,
        }
    }
}

/// Renders a template into an HTML response.
pub fn page(template: &impl Template) -> crate::errors::Result<Html<String>> {
    Ok(Html(template.render()?))
}
