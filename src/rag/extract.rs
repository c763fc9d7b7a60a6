use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No file provided")]
    Missing,
    #[error("Unsupported file type or encoding: {0}")]
    Unsupported(String),
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Text,
    Unknown,
}

fn file_kind(filename: &str) -> FileKind {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => FileKind::Pdf,
        "txt" | "md" | "json" | "csv" => FileKind::Text,
        _ => FileKind::Unknown,
    }
}

/// Extracts plain text from an uploaded file, choosing the decoder by extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
    if filename.trim().is_empty() {
        return Err(ExtractError::Missing);
    }

    match file_kind(filename) {
        FileKind::Pdf => {
            tracing::info!(filename, "Processing PDF file");
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|err| ExtractError::Pdf(err.to_string()))?;
            Ok(text.trim().to_string())
        }
        FileKind::Text => {
            tracing::info!(filename, "Processing text file");
            Ok(match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    tracing::debug!(filename, "UTF-8 decode failed, falling back to Latin-1");
                    decode_latin1(bytes)
                }
            })
        }
        FileKind::Unknown => {
            tracing::warn!(filename, "Unknown file type, attempting UTF-8 decode");
            std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| ExtractError::Unsupported(filename.to_string()))
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
