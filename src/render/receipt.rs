//! Custody receipt - a one-page letter-size PDF assigning an item to the
//! person responsible for it.
//!
//! Rendering happens in two steps: [`compose`] turns an item into a
//! [`ReceiptContent`] (all text decided, photo loaded or replaced by fallback
//! text), then [`draw`] lays that content out with `printpdf`. The photo is
//! optional decoration: a missing or unreadable file only changes the cell to
//! [`PHOTO_FALLBACK`].

use crate::{
    config::ReceiptConfig,
    entities::item,
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use printpdf::image_crate::{self, DynamicImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference,
    Point,
};
use std::path::Path;
use tracing::{debug, warn};

/// Text shown in the photo cell when there is no usable photo.
pub const PHOTO_FALLBACK: &str = "Sin imagen";

/// Labels of the blank fields the holder fills in by hand.
pub const SIGNATURE_FIELDS: [&str; 4] = [
    "Nombre y Apellido (usuario):",
    "Firma:",
    "Cargo:",
    "Fecha:",
];

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

// Letter size with 0.75in side margins and 0.5in top/bottom margins.
const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN_X: f32 = 19.05;
const MARGIN_TOP: f32 = 12.7;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;

// Table geometry: 2in | 4.5in columns, 8pt cell padding.
const LEFT_COL: f32 = 50.8;
const RIGHT_COL: f32 = 114.3;
const CELL_PAD: f32 = 2.8;
const PHOTO_MAX_HEIGHT: f32 = 76.2;

const TITLE_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const PT_TO_MM: f32 = 0.3528;
// Average Helvetica advance as a fraction of the font size.
const AVG_CHAR_EM: f32 = 0.52;

/// What goes into the photo cell.
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoCell {
    /// A decoded photo to embed
    Image(DynamicImage),
    /// Plain text shown instead of a photo
    Fallback(String),
}

/// Every piece of text and imagery on the receipt, before layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptContent {
    /// Organization name, centered bold
    pub organization: String,
    /// Line under the organization
    pub address: String,
    /// `"{city}, {day} de {month} de {year}"`
    pub date_line: String,
    /// Opening paragraph
    pub intro: String,
    /// Item code, top-left cell
    pub code: String,
    /// `"Equipo: {DESCRIPTION}"`, top-right cell
    pub equipment: String,
    /// Owner/department/accessories lines, bottom-left cell
    pub holder_lines: Vec<String>,
    /// Bottom-right cell
    pub photo: PhotoCell,
    /// Care and reporting obligations
    pub liability: String,
    /// Validity statement
    pub validity: String,
    /// Sign-off line
    pub closing: String,
}

/// Formats `date` as `16 de octubre de 2026`.
#[must_use]
pub fn long_date(date: NaiveDate) -> String {
    format!(
        "{} de {} de {}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Loads the photo at `path`, falling back to text when absent or unreadable.
#[must_use]
pub fn load_photo(path: Option<&Path>) -> PhotoCell {
    let Some(path) = path else {
        return PhotoCell::Fallback(PHOTO_FALLBACK.to_string());
    };
    match image_crate::open(path) {
        Ok(img) if img.width() > 0 && img.height() > 0 => {
            debug!(path = %path.display(), "Loaded photo for receipt");
            PhotoCell::Image(img)
        }
        Ok(_) => PhotoCell::Fallback(PHOTO_FALLBACK.to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Photo unreadable, using fallback text");
            PhotoCell::Fallback(PHOTO_FALLBACK.to_string())
        }
    }
}

/// Decides the full content of the receipt for `item` issued on `date`.
#[must_use]
pub fn compose(
    item: &item::Model,
    config: &ReceiptConfig,
    date: NaiveDate,
    photo: PhotoCell,
) -> ReceiptContent {
    ReceiptContent {
        organization: config.organization.clone(),
        address: config.address.clone(),
        date_line: format!("{}, {}", config.city, long_date(date)),
        intro: "A quien corresponda, por medio de la presente, se hace constar que el equipo \
                que se detalla a continuación ha sido asignado a la persona responsable \
                mencionada:"
            .to_string(),
        code: item.code.clone(),
        equipment: format!("Equipo: {}", item.description.to_uppercase()),
        holder_lines: vec![
            "Usuario:".to_string(),
            item.owner.to_uppercase(),
            String::new(),
            "Departamento:".to_string(),
            item.department.to_uppercase(),
            String::new(),
            "Accesorios:".to_string(),
        ],
        photo,
        liability: format!(
            "El responsable se compromete a cuidar y mantener el equipo en buen estado, así \
             como a utilizarlo exclusivamente para fines laborales relacionados con el puesto. \
             Cualquier cambio, reasignación de usuario, daño o mal funcionamiento deberá ser \
             reportado inmediatamente al departamento de {}.",
            config.department
        ),
        validity: "Esta carta tiene validez a partir de la fecha de firma y se mantendrá en \
                   los registros de la empresa."
            .to_string(),
        closing: format!("Atentamente, dpto. de {}.", config.department),
    }
}

/// Renders the receipt for `item` dated today.
///
/// # Errors
/// Returns `Error::Render` only if the PDF itself cannot be produced; photo
/// problems never fail rendering.
pub fn render_custody_receipt(
    item: &item::Model,
    config: &ReceiptConfig,
    photo_path: Option<&Path>,
) -> Result<Vec<u8>> {
    let today = chrono::Local::now().date_naive();
    let content = compose(item, config, today, load_photo(photo_path));
    draw(&content)
}

fn pdf_error(e: impl std::fmt::Display) -> Error {
    Error::Render {
        message: format!("PDF generation failed: {e}"),
    }
}

/// Estimated width of `text` in mm at `size` points.
#[allow(clippy::cast_precision_loss)]
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_CHAR_EM * PT_TO_MM
}

/// Greedy word wrap to `width` mm at `size` points.
fn wrap(text: &str, size: f32, width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && text_width(&candidate, size) > width {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn line_height(size: f32) -> f32 {
    size * 1.3 * PT_TO_MM
}

/// Writes text top-down, keeping track of the baseline.
struct Pen {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the bottom edge of the page, in mm
    y: f32,
}

impl Pen {
    fn text_at(&self, text: &str, size: f32, bold: bool, x: f32, y: f32) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.y -= line_height(size);
        self.text_at(text, size, bold, MARGIN_X, self.y);
    }

    fn centered(&mut self, text: &str, size: f32, bold: bool) {
        self.y -= line_height(size);
        let x = MARGIN_X + ((CONTENT_WIDTH - text_width(text, size)) / 2.0).max(0.0);
        self.text_at(text, size, bold, x, self.y);
    }

    fn paragraph(&mut self, text: &str, size: f32) {
        for line in wrap(text, size, CONTENT_WIDTH) {
            self.line(&line, size, false);
        }
    }

    fn space(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn rect(&self, x: f32, top: f32, width: f32, height: f32) {
        let corners = [
            (x, top),
            (x + width, top),
            (x + width, top - height),
            (x, top - height),
        ];
        self.layer.add_line(Line {
            points: corners
                .iter()
                .map(|&(px, py)| (Point::new(Mm(px), Mm(py)), false))
                .collect(),
            is_closed: true,
        });
    }
}

/// Scales a photo to fit the photo cell, keeping its aspect ratio.
#[allow(clippy::cast_precision_loss)]
fn fit_photo(img: &DynamicImage) -> (f32, f32) {
    let max_width = RIGHT_COL - 2.0 * CELL_PAD;
    let (w, h) = (img.width() as f32, img.height() as f32);
    let mut height = PHOTO_MAX_HEIGHT;
    let mut width = w * height / h;
    if width > max_width {
        width = max_width;
        height = h * width / w;
    }
    (width, height)
}

/// Lays out `content` on a letter page and serializes the PDF.
///
/// # Errors
/// Returns `Error::Render` if fonts cannot be registered or the document
/// cannot be serialized.
#[allow(clippy::cast_precision_loss)]
pub fn draw(content: &ReceiptContent) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Responsiva {}", content.code),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Contenido",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let layer = doc.get_page(page).get_layer(layer);
    layer.set_outline_thickness(1.0);
    let mut pen = Pen {
        layer,
        regular,
        bold,
        y: PAGE_HEIGHT - MARGIN_TOP,
    };

    pen.centered(&content.organization, TITLE_SIZE, true);
    pen.space(2.0);
    pen.line(&content.address, BODY_SIZE, false);
    pen.space(4.2);
    pen.line(&content.date_line, BODY_SIZE, false);
    pen.space(6.3);
    pen.paragraph(&content.intro, BODY_SIZE);
    pen.space(4.2);

    // Item table
    let body_line = line_height(BODY_SIZE);
    let equipment_lines = wrap(&content.equipment, BODY_SIZE, RIGHT_COL - 2.0 * CELL_PAD);
    let row1_height = (equipment_lines.len().max(1) as f32) * body_line + 2.0 * CELL_PAD;

    let holder_height = content.holder_lines.len() as f32 * body_line;
    let photo_size = match &content.photo {
        PhotoCell::Image(img) => Some(fit_photo(img)),
        PhotoCell::Fallback(_) => None,
    };
    let photo_height = photo_size.map_or(body_line, |(_, h)| h);
    let row2_height = holder_height.max(photo_height) + 2.0 * CELL_PAD;

    let table_top = pen.y;
    let right_x = MARGIN_X + LEFT_COL;
    pen.rect(MARGIN_X, table_top, LEFT_COL, row1_height);
    pen.rect(right_x, table_top, RIGHT_COL, row1_height);
    pen.rect(MARGIN_X, table_top - row1_height, LEFT_COL, row2_height);
    pen.rect(right_x, table_top - row1_height, RIGHT_COL, row2_height);

    let code_x = MARGIN_X + ((LEFT_COL - text_width(&content.code, BODY_SIZE)) / 2.0).max(CELL_PAD);
    let first_baseline = table_top - CELL_PAD - body_line * 0.8;
    pen.text_at(&content.code, BODY_SIZE, true, code_x, first_baseline);
    for (i, line) in equipment_lines.iter().enumerate() {
        let y = first_baseline - i as f32 * body_line;
        pen.text_at(line, BODY_SIZE, false, right_x + CELL_PAD, y);
    }

    let row2_top = table_top - row1_height;
    let second_baseline = row2_top - CELL_PAD - body_line * 0.8;
    for (i, line) in content.holder_lines.iter().enumerate() {
        let bold = line.ends_with(':');
        let y = second_baseline - i as f32 * body_line;
        pen.text_at(line, BODY_SIZE, bold, MARGIN_X + CELL_PAD, y);
    }

    match (&content.photo, photo_size) {
        (PhotoCell::Image(img), Some((width, height))) => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let dpi = rgb.width() as f32 * 25.4 / width;
            let x = right_x + (RIGHT_COL - width) / 2.0;
            let y = row2_top - CELL_PAD - height;
            Image::from_dynamic_image(&rgb).add_to_layer(
                pen.layer.clone(),
                ImageTransform {
                    translate_x: Some(Mm(x)),
                    translate_y: Some(Mm(y)),
                    dpi: Some(dpi),
                    ..Default::default()
                },
            );
        }
        (cell, _) => {
            let text = match cell {
                PhotoCell::Fallback(text) => text.as_str(),
                PhotoCell::Image(_) => PHOTO_FALLBACK,
            };
            let x = right_x + ((RIGHT_COL - text_width(text, BODY_SIZE)) / 2.0).max(CELL_PAD);
            pen.text_at(text, BODY_SIZE, false, x, second_baseline);
        }
    }

    pen.y = row2_top - row2_height;
    pen.space(6.3);
    pen.paragraph(&content.liability, BODY_SIZE);
    pen.space(2.1);
    pen.paragraph(&content.validity, BODY_SIZE);
    pen.space(2.1);
    pen.line(&content.closing, BODY_SIZE, false);
    pen.space(4.2);
    for label in SIGNATURE_FIELDS {
        pen.line(label, BODY_SIZE, true);
        pen.space(6.8);
    }

    doc.save_to_bytes().map_err(pdf_error)
}
