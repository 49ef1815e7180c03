//! Page rasterisation: PDF bytes → one encoded image per page, via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not designed to run on async worker threads. The whole render pass runs
//! on `tokio::task::spawn_blocking` so the runtime keeps serving other tasks.
//!
//! ## Resolution
//!
//! The target width is derived from `dpi` (US Letter width, 8.5 in) and then
//! capped by `max_rendered_pixels` on both edges. Statement pages are small
//! print, so 150 DPI is the default.

use crate::config::ExtractionConfig;
use crate::error::StatementError;
use crate::pipeline::encode::encode_page;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Produces one image per page, in page order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_pages(&self, document: &[u8], name: &str)
        -> Result<Vec<ImageData>, StatementError>;
}

/// [`PageRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_pixels: u32, password: Option<String>) -> Self {
        Self {
            dpi,
            max_pixels,
            password,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.dpi, config.max_rendered_pixels, config.password.clone())
    }

    /// Target width in pixels for a Letter-width page at this DPI, capped.
    pub fn target_width(&self) -> u32 {
        let at_dpi = (self.dpi as f32 * 8.5).round() as u32;
        at_dpi.min(self.max_pixels)
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render_pages(
        &self,
        document: &[u8],
        name: &str,
    ) -> Result<Vec<ImageData>, StatementError> {
        let bytes = document.to_vec();
        let name = name.to_string();
        let width = self.target_width();
        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            render_blocking(&bytes, &name, width, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| StatementError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the system library.
fn bind_pdfium() -> Result<Pdfium, StatementError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| StatementError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn render_blocking(
    bytes: &[u8],
    name: &str,
    width: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<ImageData>, StatementError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    StatementError::WrongPassword {
                        name: name.to_string(),
                    }
                } else {
                    StatementError::PasswordRequired {
                        name: name.to_string(),
                    }
                }
            } else {
                StatementError::CorruptPdf {
                    name: name.to_string(),
                    detail: err_str,
                }
            }
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("Rendering {} pages of '{}' at {} px", total, name, width);

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total);
    for idx in 0..total {
        let rasterisation_err = |detail: String| StatementError::RasterisationFailed {
            page: idx + 1,
            detail,
        };

        let page = pages
            .get(idx as u16)
            .map_err(|e| rasterisation_err(format!("{:?}", e)))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| rasterisation_err(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        images.push(encode_page(&image).map_err(|e| rasterisation_err(e.to_string()))?);
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_follows_dpi_until_capped() {
        assert_eq!(PdfiumRenderer::new(150, 2000, None).target_width(), 1275);
        assert_eq!(PdfiumRenderer::new(300, 2000, None).target_width(), 2000);
        assert_eq!(PdfiumRenderer::new(72, 2000, None).target_width(), 612);
    }

    #[test]
    fn from_config_copies_render_settings() {
        let config = ExtractionConfig::builder()
            .dpi(200)
            .max_rendered_pixels(1500)
            .password("secret")
            .build()
            .unwrap();
        let r = PdfiumRenderer::from_config(&config);
        assert_eq!(r.dpi, 200);
        assert_eq!(r.password.as_deref(), Some("secret"));
        assert_eq!(r.target_width(), 1500);
    }
}
