/// Built-in 5x7 bitmap font for image captions
pub mod glyphs;
/// Custody receipt PDF
pub mod receipt;
/// QR tagged-code PNG
pub mod tagged_code;

pub use receipt::render_custody_receipt;
pub use tagged_code::render_tagged_code;
