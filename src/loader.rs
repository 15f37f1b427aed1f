//! Source loader: one input reference → zero or more text documents.
//!
//! A reference is either a local file path or an `http(s)://` URL. Dispatch
//! is by reference shape and extension, in priority order: image URL (fetch
//! + OCR), any other URL (fetch + page-text extraction), local image (OCR),
//! then a format-specific extractor keyed by extension, with unknown
//! extensions falling back to best-effort lossy text.
//!
//! The loader never propagates an error past its boundary: any failure is
//! logged as a warning and yields an empty result, so partial ingestion can
//! proceed with the remaining sources.

use std::path::Path;

use tracing::{debug, warn};

use crate::extract;
use crate::models::{SourceDocument, SourceKind};
use crate::ocr;

/// A PDF whose direct extraction yields fewer non-whitespace characters
/// than this is considered scanned and goes through OCR.
pub const MIN_EXTRACTED_CHARS: usize = 50;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff", "gif"];

/// Where a reference dispatches, decided purely from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    ImageUrl,
    WebPage,
    Image,
    Pdf,
    Text,
    Word,
    Presentation,
    Spreadsheet,
    Csv,
    Unknown,
}

/// Classify a reference by URL shape and extension. Pure; no I/O.
pub fn classify_ref(reference: &str) -> RefKind {
    let is_url = reference.starts_with("http://") || reference.starts_with("https://");
    let ext = extension_of(reference);

    if is_url {
        if matches_image(&ext) {
            return RefKind::ImageUrl;
        }
        return RefKind::WebPage;
    }
    if matches_image(&ext) {
        return RefKind::Image;
    }
    match ext.as_str() {
        "pdf" => RefKind::Pdf,
        "txt" | "md" | "markdown" | "rst" | "log" => RefKind::Text,
        "docx" | "doc" => RefKind::Word,
        "pptx" | "ppt" => RefKind::Presentation,
        "xlsx" | "xls" => RefKind::Spreadsheet,
        "csv" | "tsv" => RefKind::Csv,
        _ => RefKind::Unknown,
    }
}

fn extension_of(reference: &str) -> String {
    // Strip URL query/fragment so "photo.png?size=2" classifies as png.
    let trimmed = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    Path::new(trimmed)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn matches_image(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

/// Load one reference into zero or more documents. Never returns an error;
/// failures are logged and produce an empty vec.
pub async fn load(client: &reqwest::Client, reference: &str) -> Vec<SourceDocument> {
    let kind = classify_ref(reference);
    debug!(reference, ?kind, "loading source");

    let result = match kind {
        RefKind::ImageUrl => load_image_url(client, reference).await,
        RefKind::WebPage => load_web_page(client, reference).await,
        RefKind::Image => load_local_image(reference).await,
        RefKind::Pdf => load_pdf(reference).await,
        RefKind::Text | RefKind::Unknown => load_plain_text(reference).await,
        RefKind::Word => load_with(reference, SourceKind::Word, extract::extract_docx).await,
        RefKind::Presentation => {
            load_with(reference, SourceKind::Presentation, extract::extract_pptx).await
        }
        RefKind::Spreadsheet => {
            load_with(reference, SourceKind::Spreadsheet, extract::extract_xlsx).await
        }
        RefKind::Csv => load_csv(reference).await,
    };

    match result {
        Ok(docs) => docs,
        Err(e) => {
            warn!(reference, error = %e, "failed to load source");
            Vec::new()
        }
    }
}

async fn load_image_url(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Vec<SourceDocument>> {
    if !ocr::tesseract_available() {
        debug!(url, "skipping image URL: no OCR engine");
        return Ok(Vec::new());
    }
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    let text = ocr::ocr_image_bytes(&bytes).await;
    Ok(into_documents(text, url, SourceKind::ImageUrl))
}

async fn load_web_page(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Vec<SourceDocument>> {
    let html = client.get(url).send().await?.error_for_status()?.text().await?;
    let text = html_to_text(&html);
    Ok(into_documents(text, url, SourceKind::WebPage))
}

async fn load_local_image(path: &str) -> anyhow::Result<Vec<SourceDocument>> {
    if !ocr::tesseract_available() {
        debug!(path, "skipping image: no OCR engine");
        return Ok(Vec::new());
    }
    let text = ocr::ocr_image(Path::new(path)).await;
    Ok(into_documents(text, path, SourceKind::Image))
}

async fn load_pdf(path: &str) -> anyhow::Result<Vec<SourceDocument>> {
    let bytes = tokio::fs::read(path).await?;
    let mut text = match extract::extract_pdf(&bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(path, error = %e, "direct PDF extraction failed");
            String::new()
        }
    };

    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    if visible < MIN_EXTRACTED_CHARS {
        if ocr::tesseract_available() {
            debug!(path, visible, "PDF text too sparse, falling back to OCR");
            text = ocr::ocr_pdf(Path::new(path)).await;
        } else {
            debug!(path, visible, "PDF text too sparse and no OCR engine");
        }
    }
    Ok(into_documents(text, path, SourceKind::Pdf))
}

async fn load_plain_text(path: &str) -> anyhow::Result<Vec<SourceDocument>> {
    let bytes = tokio::fs::read(path).await?;
    let text = extract::extract_text_lossy(&bytes);
    Ok(into_documents(text, path, SourceKind::Text))
}

async fn load_csv(path: &str) -> anyhow::Result<Vec<SourceDocument>> {
    let bytes = tokio::fs::read(path).await?;
    let text = extract::extract_csv(&bytes);
    Ok(into_documents(text, path, SourceKind::Csv))
}

async fn load_with(
    path: &str,
    kind: SourceKind,
    extractor: fn(&[u8]) -> Result<String, extract::ExtractError>,
) -> anyhow::Result<Vec<SourceDocument>> {
    let bytes = tokio::fs::read(path).await?;
    let text = extractor(&bytes)?;
    Ok(into_documents(text, path, kind))
}

fn into_documents(text: String, source: &str, kind: SourceKind) -> Vec<SourceDocument> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![SourceDocument {
        content: text,
        source: source.to_string(),
        kind,
    }]
}

/// Extract readable text from an HTML page, skipping script and style.
fn html_to_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let skip = ["script", "style", "noscript"];
    let mut out = String::new();

    // Walk text nodes, ignoring anything under a skipped element.
    for node in document.tree.nodes() {
        if let scraper::node::Node::Text(text) = node.value() {
            let in_skipped = node.ancestors().any(|a| {
                matches!(
                    a.value(),
                    scraper::node::Node::Element(el) if skip.contains(&el.name())
                )
            });
            if in_skipped {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(trimmed);
            }
        }
    }
    out
}
