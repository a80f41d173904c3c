//! Text extraction gateway
//!
//! Pure Rust text extraction from documents - no external system
//! dependencies required.
//!
//! ## Supported Formats
//! - PDF: text extraction via pdf-extract
//! - Excel: .xlsx, .xls via calamine
//! - Word: .docx via docx-rs (.doc is attempted as DOCX; many are mislabeled)
//! - Text: .txt, .md, .csv, .json, .xml, .html (direct read)
//! - Audio: transcription through the AI service
//! - Images: no text layer here; vision categorization handles them
//!
//! The gateway retries transient file-lock errors with a fixed backoff;
//! every other failure surfaces immediately.

use crate::ai::{DocumentAi, TokenCharge};
use calamine::{open_workbook, Reader, Xls, Xlsx};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Maximum text length to extract (to avoid memory issues with huge docs)
const MAX_TEXT_LENGTH: usize = 500_000;

/// Minimum extracted PDF text before we call it scanned/image-based
const MIN_PDF_TEXT_LENGTH: usize = 50;

/// Attempts made when a file is locked by another process
const MAX_LOCK_ATTEMPTS: u32 = 3;

/// Fixed delay between lock-retry attempts
const LOCK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("file is locked: {0}")]
    Locked(String),
    #[error("unsupported file type for text extraction: {0}")]
    Unsupported(String),
    #[error("failed to read file: {0}")]
    Io(String),
    #[error("extraction failed: {0}")]
    Parse(String),
    #[error("audio transcription failed: {0}")]
    Transcription(String),
}

impl ExtractionError {
    /// Whether this failure is a transient lock worth retrying
    pub fn is_lock_error(&self) -> bool {
        match self {
            ExtractionError::Locked(_) => true,
            ExtractionError::Io(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("locked") || msg.contains("ebusy") || msg.contains("resource busy")
            }
            _ => false,
        }
    }
}

/// How the document was parsed
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMethod {
    /// Native text extraction (pdf-extract, calamine, docx-rs)
    NativeText,
    /// Simple file read (for plain text files)
    DirectRead,
    /// AI audio transcription
    Transcription,
    /// No text layer; vision categorization analyzes the image itself
    VisionDeferred,
}

/// Document metadata from extraction
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub page_count: Option<u32>,
    pub word_count: Option<u32>,
}

/// Result of text extraction
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub method: ExtractionMethod,
}

impl ExtractedDocument {
    fn from_text(text: String, method: ExtractionMethod) -> Self {
        let word_count = text.split_whitespace().count() as u32;
        Self {
            text,
            metadata: DocumentMetadata {
                word_count: Some(word_count),
                ..Default::default()
            },
            method,
        }
    }
}

/// Dispatches a file path plus declared type to the right format extractor
pub struct TextExtractor {
    ai: Arc<dyn DocumentAi>,
}

impl TextExtractor {
    pub fn new(ai: Arc<dyn DocumentAi>) -> Self {
        Self { ai }
    }

    /// Extract text, retrying transient lock errors up to
    /// `MAX_LOCK_ATTEMPTS` times with a fixed backoff. Also returns the
    /// token charge when extraction went through the AI (audio).
    pub async fn extract(
        &self,
        path: &Path,
        extension: &str,
    ) -> Result<(ExtractedDocument, Option<TokenCharge>), ExtractionError> {
        let mut attempt = 1;
        loop {
            match self.extract_once(path, extension).await {
                Err(e) if e.is_lock_error() && attempt < MAX_LOCK_ATTEMPTS => {
                    tracing::warn!(
                        "[Extraction] {} is locked (attempt {}/{}), retrying",
                        path.display(),
                        attempt,
                        MAX_LOCK_ATTEMPTS
                    );
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn extract_once(
        &self,
        path: &Path,
        extension: &str,
    ) -> Result<(ExtractedDocument, Option<TokenCharge>), ExtractionError> {
        let ext = extension.to_lowercase();

        if is_audio_extension(&ext) {
            let (text, charge) = self
                .ai
                .transcribe_audio(path)
                .await
                .map_err(|e| ExtractionError::Transcription(e.to_string()))?;
            let doc =
                ExtractedDocument::from_text(clean_text(&text), ExtractionMethod::Transcription);
            return Ok((doc, Some(charge)));
        }

        if crate::ai::vision::is_image_extension(&ext) {
            // No OCR stack; the vision call reads the image directly
            return Ok((
                ExtractedDocument::from_text(String::new(), ExtractionMethod::VisionDeferred),
                None,
            ));
        }

        let path = path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parse_document(&path, &ext))
            .await
            .map_err(|e| ExtractionError::Parse(format!("extraction task failed: {}", e)))??;

        Ok((parsed, None))
    }
}

/// Synchronous format dispatch, run on the blocking pool
fn parse_document(path: &PathBuf, ext: &str) -> Result<ExtractedDocument, ExtractionError> {
    match ext {
        e if is_plain_text_extension(e) => read_plain_text(path),
        "pdf" => extract_pdf(path),
        "xlsx" => extract_xlsx(path),
        "xls" => extract_xls(path),
        "docx" | "doc" => extract_docx(path, ext),
        "html" | "htm" => read_plain_text(path),
        other => Err(ExtractionError::Unsupported(other.to_string())),
    }
}

fn is_plain_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "md" | "csv" | "json" | "xml" | "yaml" | "yml" | "log" | "ini" | "cfg"
            | "conf" | "toml" | "env"
    )
}

fn is_audio_extension(ext: &str) -> bool {
    matches!(ext, "mp3" | "wav" | "m4a" | "flac" | "ogg" | "oga" | "aac" | "webm")
}

fn io_error(e: std::io::Error) -> ExtractionError {
    ExtractionError::Io(e.to_string())
}

/// Read plain text file directly
fn read_plain_text(path: &PathBuf) -> Result<ExtractedDocument, ExtractionError> {
    let text = std::fs::read_to_string(path).map_err(io_error)?;
    let text = truncate_text(&clean_text(&text));

    tracing::debug!(
        "[Extraction] Direct read: {} chars from {}",
        text.len(),
        path.display()
    );

    Ok(ExtractedDocument::from_text(text, ExtractionMethod::DirectRead))
}

/// Extract text from PDF using pdf-extract
/// Wrapped in catch_unwind to handle panics from malformed PDFs
fn extract_pdf(path: &PathBuf) -> Result<ExtractedDocument, ExtractionError> {
    tracing::debug!("[Extraction] Starting PDF extraction: {}", path.display());

    let bytes = std::fs::read(path).map_err(io_error)?;

    // The pdf_extract crate (and its cff-parser dependency) can panic on
    // certain fonts/glyphs
    let text = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    })) {
        Ok(Ok(t)) => t,
        Ok(Err(e)) => {
            tracing::warn!("[Extraction] PDF extraction failed for {}: {}", path.display(), e);
            return Err(ExtractionError::Parse(format!("PDF extraction failed: {}", e)));
        }
        Err(_panic) => {
            tracing::error!(
                "[Extraction] PDF extraction panicked for {} - likely malformed font/glyph",
                path.display()
            );
            return Err(ExtractionError::Parse(
                "PDF extraction panicked - likely contains malformed fonts".to_string(),
            ));
        }
    };

    let text = clean_text(&text);

    if text.len() < MIN_PDF_TEXT_LENGTH {
        return Err(ExtractionError::Parse(format!(
            "PDF text too short ({} chars) - likely scanned/image-based",
            text.len()
        )));
    }

    let text = truncate_text(&text);
    let mut doc = ExtractedDocument::from_text(text, ExtractionMethod::NativeText);
    doc.metadata.page_count = Some((doc.text.len() / 3000).max(1) as u32);

    tracing::info!(
        "[Extraction] PDF extracted: {} chars from {}",
        doc.text.len(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(doc)
}

/// Extract text from XLSX using calamine
fn extract_xlsx(path: &PathBuf) -> Result<ExtractedDocument, ExtractionError> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| ExtractionError::Parse(format!("Failed to open XLSX: {}", e)))?;
    extract_sheets(path, &mut workbook)
}

/// Extract text from XLS (older Excel format) using calamine
fn extract_xls(path: &PathBuf) -> Result<ExtractedDocument, ExtractionError> {
    let mut workbook: Xls<_> = open_workbook(path)
        .map_err(|e| ExtractionError::Parse(format!("Failed to open XLS: {}", e)))?;
    extract_sheets(path, &mut workbook)
}

/// Walk every sheet of a workbook into pipe-delimited rows
fn extract_sheets<R: Reader<std::io::BufReader<std::fs::File>>>(
    path: &PathBuf,
    workbook: &mut R,
) -> Result<ExtractedDocument, ExtractionError> {
    let mut all_text = String::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    for sheet_name in &sheet_names {
        if let Ok(range) = workbook.worksheet_range(sheet_name) {
            all_text.push_str(&format!("\n=== Sheet: {} ===\n", sheet_name));

            for row in range.rows() {
                let row_text: Vec<String> = row
                    .iter()
                    .map(|cell| cell.to_string())
                    .filter(|s| !s.is_empty())
                    .collect();

                if !row_text.is_empty() {
                    all_text.push_str(&row_text.join(" | "));
                    all_text.push('\n');
                }
            }
        }
    }

    let text = truncate_text(&clean_text(&all_text));

    tracing::info!(
        "[Extraction] Spreadsheet extracted: {} chars, {} sheets from {}",
        text.len(),
        sheet_names.len(),
        path.display()
    );

    let mut doc = ExtractedDocument::from_text(text, ExtractionMethod::NativeText);
    doc.metadata.page_count = Some(sheet_names.len() as u32);
    Ok(doc)
}

/// Extract text from DOCX using docx-rs. Legacy `.doc` files are attempted
/// with the same parser; genuinely old binary files fail with a clear error.
fn extract_docx(path: &PathBuf, ext: &str) -> Result<ExtractedDocument, ExtractionError> {
    let bytes = std::fs::read(path).map_err(io_error)?;

    let doc = docx_rs::read_docx(&bytes).map_err(|e| {
        if ext == "doc" {
            ExtractionError::Parse(format!(
                "legacy .doc format could not be parsed as DOCX: {}",
                e
            ))
        } else {
            ExtractionError::Parse(format!("Failed to parse DOCX: {}", e))
        }
    })?;

    let mut all_text = String::new();
    for child in doc.document.children {
        extract_docx_content(&child, &mut all_text);
    }

    let text = truncate_text(&clean_text(&all_text));

    tracing::info!(
        "[Extraction] DOCX extracted: {} chars from {}",
        text.len(),
        path.display()
    );

    Ok(ExtractedDocument::from_text(text, ExtractionMethod::NativeText))
}

/// Recursively extract text from DOCX document elements
fn extract_docx_content(element: &docx_rs::DocumentChild, output: &mut String) {
    match element {
        docx_rs::DocumentChild::Paragraph(para) => {
            for child in &para.children {
                match child {
                    docx_rs::ParagraphChild::Run(run) => {
                        for run_child in &run.children {
                            if let docx_rs::RunChild::Text(text) = run_child {
                                output.push_str(&text.text);
                            }
                        }
                    }
                    docx_rs::ParagraphChild::Hyperlink(link) => {
                        for run in &link.children {
                            if let docx_rs::ParagraphChild::Run(r) = run {
                                for run_child in &r.children {
                                    if let docx_rs::RunChild::Text(text) = run_child {
                                        output.push_str(&text.text);
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            output.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    for child in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = child {
                            for p_child in &para.children {
                                if let docx_rs::ParagraphChild::Run(run) = p_child {
                                    for run_child in &run.children {
                                        if let docx_rs::RunChild::Text(text) = run_child {
                                            output.push_str(&text.text);
                                        }
                                    }
                                }
                            }
                            output.push_str(" | ");
                        }
                    }
                }
                output.push('\n');
            }
        }
        _ => {}
    }
}

/// Clean extracted text
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate text to max length, preserving word boundaries
fn truncate_text(text: &str) -> String {
    if text.len() <= MAX_TEXT_LENGTH {
        return text.to_string();
    }

    let truncated = &text[..MAX_TEXT_LENGTH];

    if let Some(pos) = truncated.rfind("\n\n") {
        return truncated[..pos].to_string();
    }

    if let Some(pos) = truncated.rfind(". ") {
        return truncated[..=pos].to_string();
    }

    if let Some(pos) = truncated.rfind(' ') {
        return truncated[..pos].to_string();
    }

    truncated.to_string()
}
