//! Tagged-code image - a QR code of the item summary with the item code
//! printed underneath in plain text.

use super::glyphs::{self, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};
use crate::{
    entities::item,
    errors::{Error, Result},
};
use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use std::io::Cursor;

/// Pixels per QR module.
const MODULE_PX: u32 = 8;
/// Light modules around the symbol, as required by scanners.
const QUIET_ZONE: u32 = 4;
/// Pixels per font pixel in the caption.
const CAPTION_SCALE: u32 = 4;
/// Blank space above and below the caption.
const CAPTION_MARGIN: u32 = 16;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// The text encoded into the QR symbol.
#[must_use]
pub fn tagged_summary(item: &item::Model) -> String {
    format!(
        "Code: {} Description: {} Owner: {} Dept: {}",
        item.code, item.description, item.owner, item.department
    )
}

/// Renders the tagged-code PNG for `item`.
///
/// # Errors
/// Returns `Error::Render` if the summary does not fit in a QR symbol or PNG
/// encoding fails.
pub fn render_tagged_code(item: &item::Model) -> Result<Vec<u8>> {
    let canvas = compose(&tagged_summary(item), &item.code)?;

    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::Render {
            message: format!("PNG encoding failed: {e}"),
        })?;
    Ok(png)
}

/// Draws the QR symbol for `payload` with `caption` centered below it.
fn compose(payload: &str, caption: &str) -> Result<GrayImage> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| Error::Render {
        message: format!("QR encoding failed: {e}"),
    })?;
    let modules = u32::try_from(code.width()).map_err(|_| Error::Render {
        message: "QR symbol too large".to_string(),
    })?;
    let colors = code.to_colors();

    let qr_px = (modules + 2 * QUIET_ZONE) * MODULE_PX;
    let caption_px = glyphs::text_width(caption) * CAPTION_SCALE;
    let width = qr_px.max(caption_px + 2 * CAPTION_MARGIN);
    let height = qr_px + GLYPH_HEIGHT * CAPTION_SCALE + 2 * CAPTION_MARGIN;

    let mut canvas = GrayImage::from_pixel(width, height, LIGHT);

    let qr_left = (width - qr_px) / 2 + QUIET_ZONE * MODULE_PX;
    let qr_top = QUIET_ZONE * MODULE_PX;
    for (index, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        let (mx, my) = (index % modules, index / modules);
        fill(
            &mut canvas,
            qr_left + mx * MODULE_PX,
            qr_top + my * MODULE_PX,
            MODULE_PX,
        );
    }

    let mut x = (width - caption_px) / 2;
    let y = qr_px + CAPTION_MARGIN;
    for c in caption.chars() {
        let rows = glyphs::glyph(c);
        for gy in 0..GLYPH_HEIGHT {
            for gx in 0..GLYPH_WIDTH {
                if glyphs::is_set(&rows, gx, gy) {
                    fill(
                        &mut canvas,
                        x + gx * CAPTION_SCALE,
                        y + gy * CAPTION_SCALE,
                        CAPTION_SCALE,
                    );
                }
            }
        }
        x += (GLYPH_WIDTH + GLYPH_SPACING) * CAPTION_SCALE;
    }

    Ok(canvas)
}

/// Paints a dark `size`x`size` square with its top-left corner at (`x`, `y`).
fn fill(canvas: &mut GrayImage, x: u32, y: u32, size: u32) {
    for py in y..(y + size).min(canvas.height()) {
        for px in x..(x + size).min(canvas.width()) {
            canvas.put_pixel(px, py, DARK);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn sample_item() -> item::Model {
        item::Model {
            id: 1,
            code: "MON001".to_string(),
            description: "Dell 24in".to_string(),
            identifier: None,
            owner: "Ana".to_string(),
            department: "IT".to_string(),
            notes: None,
            photo: "placeholder.png".to_string(),
        }
    }

    #[test]
    fn test_tagged_summary() {
        assert_eq!(
            tagged_summary(&sample_item()),
            "Code: MON001 Description: Dell 24in Owner: Ana Dept: IT"
        );
    }

    #[test]
    fn test_render_produces_png_with_caption_band() {
        let png = render_tagged_code(&sample_item()).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

        let decoded = image::load_from_memory(&png).unwrap().to_luma8();
        assert!(decoded.height() > decoded.width());

        // the caption band below the symbol has ink in it
        let band_top = decoded.width().min(decoded.height()) + CAPTION_MARGIN;
        let caption_ink = (band_top..decoded.height())
            .flat_map(|y| (0..decoded.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| decoded.get_pixel(x, y)[0] == 0)
            .count();
        assert!(caption_ink > 0);
    }

    #[test]
    fn test_caption_is_centered() {
        let canvas = compose("payload", "MON001").unwrap();
        let top = canvas.height() - GLYPH_HEIGHT * CAPTION_SCALE - CAPTION_MARGIN;
        let dark_columns: Vec<u32> = (0..canvas.width())
            .filter(|&x| (top..canvas.height()).any(|y| canvas.get_pixel(x, y)[0] == 0))
            .collect();

        let left = dark_columns[0];
        let right = canvas.width() - 1 - dark_columns[dark_columns.len() - 1];
        assert!(left.abs_diff(right) <= 2 * CAPTION_SCALE);
    }

    #[test]
    fn test_oversized_payload_is_render_error() {
        let huge = "x".repeat(8000);
        assert!(matches!(compose(&huge, "MON001"), Err(Error::Render { .. })));
    }
}
