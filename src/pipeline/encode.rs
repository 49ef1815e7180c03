//! Image encoding: rendered page → base64 PNG wrapped in `ImageData`.
//!
//! The extraction model receives the page image alongside the table markup so
//! it can cross-check OCR'd digits against the printed statement. PNG keeps
//! small print crisp; `detail: "high"` keeps vision providers from downscaling
//! the page to a single low-resolution tile.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
