//! Pipeline stages for statement extraction.
//!
//! Each submodule implements one transformation step so it can be tested on
//! its own and, for the three external services, swapped behind a trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ sanitize ──▶ tables ──▶ merge ──▶ extract
//!   │                                                   ▲
//!   └─────▶ render ──▶ encode ──────────────────────────┘
//! ```
//!
//! 1. [`input`]:    validate bytes, or load them from a path or URL
//! 2. [`ocr`]:      document → per-page markdown (external, [`ocr::OcrService`])
//! 3. [`sanitize`]: strip `<br>` and inline-math artefacts
//! 4. [`tables`]:   markdown → `(header, rows)` tables via an HTML round trip
//! 5. [`merge`]:    fold fragments sharing a header into logical tables and
//!    render each page's fragments as `<table>` markup
//! 6. [`render`] + [`encode`]: one base64 PNG per page via pdfium
//! 7. [`extract`]:  prompt the vision model and validate its JSON reply

pub mod encode;
pub mod extract;
pub mod input;
pub mod merge;
pub mod ocr;
pub mod render;
pub mod sanitize;
pub mod tables;
