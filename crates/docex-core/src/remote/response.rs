//! Response parsing and upload MIME detection.

use std::path::Path;

use super::{Extraction, Result};
use crate::error::RemoteError;

/// Parse model output into fields, keeping the raw text when it is not a
/// JSON object.
///
/// A surrounding Markdown code fence (```json ... ```) is tolerated.
pub fn parse_extraction(text: &str) -> Extraction {
    let body = strip_code_fence(text);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => Extraction::Fields(fields),
        _ => Extraction::RawText(text.to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}

/// MIME type declared for an upload. Only PDFs and images are accepted.
pub fn mime_type_for(path: &Path) -> Result<String> {
    let mime = mime_guess::from_path(path)
        .first()
        .ok_or_else(|| RemoteError::UnsupportedType(path.display().to_string()))?;

    if mime.essence_str() == "application/pdf" || mime.type_() == mime_guess::mime::IMAGE {
        Ok(mime.essence_str().to_string())
    } else {
        Err(RemoteError::UnsupportedType(format!(
            "{} ({})",
            path.display(),
            mime.essence_str()
        )))
    }
}
