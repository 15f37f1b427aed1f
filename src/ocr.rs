//! OCR fallback via the Tesseract system binary.
//!
//! Used when direct extraction of a PDF yields too little text, or when the
//! source is an image. PDFs are rasterized page-by-page with `pdftoppm`
//! (poppler) into a scratch directory, then each page goes through
//! `tesseract`; page texts are joined with newlines.
//!
//! Every failure collapses to an empty string — the loader treats that as
//! "no usable content from this source" and moves on.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio::process::Command;
use tracing::{debug, warn};

static TESSERACT_PRESENT: OnceLock<bool> = OnceLock::new();

/// Whether the `tesseract` binary is on `PATH`. Probed once per process;
/// absence makes OCR a soft skip rather than a failure.
pub fn tesseract_available() -> bool {
    *TESSERACT_PRESENT.get_or_init(|| {
        let present = std::process::Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !present {
            debug!("tesseract binary not found; OCR disabled");
        }
        present
    })
}

/// OCR a single image file. Returns `""` on any failure.
pub async fn ocr_image(path: &Path) -> String {
    match run_tesseract(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "OCR failed");
            String::new()
        }
    }
}

/// OCR image bytes (e.g. fetched from an image URL). Returns `""` on any
/// failure.
pub async fn ocr_image_bytes(bytes: &[u8]) -> String {
    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "could not create OCR scratch dir");
            return String::new();
        }
    };
    let path = scratch.path().join("image");
    if let Err(e) = tokio::fs::write(&path, bytes).await {
        warn!(error = %e, "could not stage image bytes for OCR");
        return String::new();
    }
    ocr_image(&path).await
}

/// OCR every page of a PDF, joining page texts with newlines. Returns `""`
/// on any failure (including `pdftoppm` being absent).
pub async fn ocr_pdf(path: &Path) -> String {
    match rasterize_and_read(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "PDF OCR failed");
            String::new()
        }
    }
}

async fn rasterize_and_read(path: &Path) -> anyhow::Result<String> {
    let scratch = tempfile::tempdir()?;
    let prefix = scratch.path().join("page");

    let output = Command::new("pdftoppm")
        .arg("-r")
        .arg("200")
        .arg("-png")
        .arg(path)
        .arg(&prefix)
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let mut pages: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        pages.push(entry.path());
    }
    // pdftoppm zero-pads page numbers, so lexical order is page order.
    pages.sort();

    let mut out = String::new();
    for page in pages {
        let text = run_tesseract(&page).await?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

async fn run_tesseract(image: &Path) -> anyhow::Result<String> {
    // `stdout` as output base makes tesseract write text to stdout.
    let output = Command::new("tesseract")
        .arg(image)
        .arg("stdout")
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!(
            "tesseract failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
