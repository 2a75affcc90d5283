//! Document text extraction
//!
//! Turns an uploaded BRD (plain text, DOCX or PDF) into the text sent to
//! the LLM. Format detection uses the content type first, then the file
//! extension.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::AppError;

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
    LegacyDoc,
    Unknown,
}

impl DocumentFormat {
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Self {
        let name = file_name.to_ascii_lowercase();
        let content_type = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type == "text/plain" || name.ends_with(".txt") {
            Self::Text
        } else if content_type == "application/pdf" || name.ends_with(".pdf") {
            Self::Pdf
        } else if content_type == DOCX_CONTENT_TYPE || name.ends_with(".docx") {
            Self::Docx
        } else if content_type == "application/msword" || name.ends_with(".doc") {
            Self::LegacyDoc
        } else {
            Self::Unknown
        }
    }
}

/// Extract plain text from an uploaded document
///
/// `max_text_bytes` bounds the decompressed DOCX body and the extracted
/// text, since both can be far larger than the upload itself. PDF parsing
/// is CPU-bound and runs on the blocking pool.
pub async fn extract_text(
    file_name: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
    max_text_bytes: usize,
) -> Result<String, AppError> {
    let text = match DocumentFormat::detect(file_name, content_type) {
        DocumentFormat::Text => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentFormat::Pdf => tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(pdf_task_error)??,
        DocumentFormat::Docx => extract_docx_text(&bytes, max_text_bytes)?,
        DocumentFormat::LegacyDoc => {
            return Err(AppError::Validation(
                "Legacy Word document (.doc) format is not supported. \
                 Please convert to .txt or .docx first."
                    .to_string(),
            ));
        }
        DocumentFormat::Unknown => String::from_utf8(bytes).map_err(|_| {
            AppError::Validation(format!(
                "Unsupported file type: {}. Please use a .txt, .pdf, or .docx file.",
                content_type.unwrap_or("unknown")
            ))
        })?,
    };

    if text.len() > max_text_bytes {
        return Err(too_large(max_text_bytes));
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation(
            "No text could be extracted from the document".to_string(),
        ));
    }
    Ok(text.to_string())
}

fn too_large(max_text_bytes: usize) -> AppError {
    AppError::Validation(format!(
        "Document is too large to process (more than {} bytes of text)",
        max_text_bytes
    ))
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, AppError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        AppError::Validation(format!(
            "Failed to parse PDF: {}. Please try converting to .txt file.",
            e
        ))
    })
}

/// pdf-extract panics on some malformed files; that is still a bad upload
fn pdf_task_error(error: tokio::task::JoinError) -> AppError {
    if error.is_panic() {
        tracing::warn!("PDF parser panicked on upload");
        AppError::Validation(
            "Failed to parse PDF. Please try converting to .txt file.".to_string(),
        )
    } else {
        AppError::Internal(error.into())
    }
}

fn invalid_docx(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Failed to parse DOCX document: {}", e))
}

/// Text runs of `word/document.xml`, one line per paragraph
///
/// The XML part is read through a `max_xml_bytes` window so a small,
/// highly compressed upload cannot inflate without bound.
pub fn extract_docx_text(bytes: &[u8], max_xml_bytes: usize) -> Result<String, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(invalid_docx)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(invalid_docx)?;
    if entry.size() > max_xml_bytes as u64 {
        return Err(too_large(max_xml_bytes));
    }

    let mut xml = String::new();
    entry
        .take(max_xml_bytes as u64 + 1)
        .read_to_string(&mut xml)
        .map_err(invalid_docx)?;
    // Declared sizes can lie
    if xml.len() > max_xml_bytes {
        return Err(too_large(max_xml_bytes));
    }

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event().map_err(invalid_docx)? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run => {
                text.push_str(&t.unescape().map_err(invalid_docx)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}
