//! PDF rasterisation: one PNG per page under the document's working directory.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on a Tokio worker. Rendering a 20-page paper at
//! 300 DPI takes seconds of CPU, so it goes to the blocking pool.
//!
//! ## Reuse
//!
//! Images are written as `page_<n>.png`. Once every page is on disk a
//! `pages.json` manifest records the page count. A later run reuses the
//! images only when the manifest is present and every page it lists exists,
//! so a render that died halfway is redone instead of passing for a short
//! document.

use crate::error::TranslateError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest edge cap. A0 posters at 300 DPI would otherwise exceed 14,000 px.
const MAX_EDGE_PX: i32 = 4096;

/// File name of 1-based page `n`.
pub fn page_image_name(n: usize) -> String {
    format!("page_{n}.png")
}

/// Written next to the images once a render has finished.
pub const RENDER_MANIFEST: &str = "pages.json";

#[derive(Debug, Serialize, Deserialize)]
struct RenderManifest {
    page_count: usize,
}

/// Record that all `page_count` images of `dir` are complete.
pub fn write_render_manifest(dir: &Path, page_count: usize) -> std::io::Result<()> {
    let json = serde_json::to_vec(&RenderManifest { page_count })?;
    let tmp = dir.join(format!("{RENDER_MANIFEST}.tmp"));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, dir.join(RENDER_MANIFEST))
}

/// Page images of a finished render in `dir`, ordered by page number.
///
/// Returns `None` without a readable manifest, for a zero page count, or
/// when any page the manifest lists is missing.
pub fn existing_page_images(dir: &Path) -> Option<Vec<PathBuf>> {
    let raw = std::fs::read(dir.join(RENDER_MANIFEST)).ok()?;
    let manifest: RenderManifest = match serde_json::from_slice(&raw) {
        Ok(m) => m,
        Err(e) => {
            warn!("Ignoring unreadable {} in {}: {}", RENDER_MANIFEST, dir.display(), e);
            return None;
        }
    };
    if manifest.page_count == 0 {
        return None;
    }
    let paths: Vec<PathBuf> = (1..=manifest.page_count)
        .map(|n| dir.join(page_image_name(n)))
        .collect();
    if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
        warn!(
            "{} lists {} pages but {} is missing; rendering again",
            RENDER_MANIFEST,
            manifest.page_count,
            missing.display()
        );
        return None;
    }
    Some(paths)
}

/// Whether `dir` holds page images that no manifest vouches for.
fn has_stray_page_images(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with("page_") && name.ends_with(".png")
            })
        })
        .unwrap_or(false)
}

/// Rasterise every page of `pdf_path` into `out_dir` at `dpi`.
///
/// Returns the image paths in page order.
pub async fn render_document(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>, TranslateError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| TranslateError::CreateDirFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;

    if let Some(existing) = existing_page_images(out_dir) {
        info!(
            "Found {} page images in {}, skipping rasterisation",
            existing.len(),
            out_dir.display()
        );
        return Ok(existing);
    }
    if has_stray_page_images(out_dir) {
        warn!(
            "Incomplete page images in {}, rendering again",
            out_dir.display()
        );
    }

    let pdf = pdf_path.to_path_buf();
    let dir = out_dir.to_path_buf();
    tokio::task::spawn_blocking(move || render_blocking(&pdf, &dir, dpi))
        .await
        .map_err(|e| TranslateError::Internal(format!("Render task panicked: {}", e)))?
}

/// `PDFIUM_LIB_PATH` first, then the working directory, then the system
/// loader path.
fn bind_pdfium() -> Result<Pdfium, TranslateError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.trim().is_empty() => Pdfium::bind_to_library(PathBuf::from(p)),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| TranslateError::PdfiumBindingFailed(e.to_string()))
}

fn render_blocking(pdf_path: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>, TranslateError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| TranslateError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("Rasterising {} ({} pages, {} DPI)", pdf_path.display(), total, dpi);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_EDGE_PX)
        .set_maximum_height(MAX_EDGE_PX);

    let mut paths = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let raster_err = |detail: String| TranslateError::RasterisationFailed {
            page: page_num,
            detail,
        };
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| raster_err(format!("{:?}", e)))?;
        let image = bitmap.as_image();

        let path = out_dir.join(page_image_name(page_num));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| raster_err(e.to_string()))?;
        debug!(
            "Rendered page {} -> {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        paths.push(path);
    }

    write_render_manifest(out_dir, paths.len()).map_err(|source| {
        TranslateError::OutputWriteFailed {
            path: out_dir.join(RENDER_MANIFEST),
            source,
        }
    })?;
    Ok(paths)
}
