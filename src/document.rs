use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{AppError, AppResult};
use crate::llm::Part;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Upload size shown to users as guidance. Not enforced here.
pub const RECOMMENDED_MAX_BYTES: usize = 10 * 1024 * 1024;

/// A validated PDF earnings report, immutable once accepted.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    name: Option<String>,
    media_type: String,
    bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(bytes: Vec<u8>, media_type: &str) -> AppResult<Self> {
        if bytes.is_empty() {
            return Err(AppError::Input("No file provided for analysis.".to_string()));
        }
        let media_type = media_type.trim().to_ascii_lowercase();
        if media_type != PDF_MEDIA_TYPE {
            return Err(AppError::Input(
                "Invalid file type. Please upload a PDF.".to_string(),
            ));
        }
        Ok(Self {
            name: None,
            media_type,
            bytes,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reads a file, taking the media type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let media_type = media_type_for(path);
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::Input(format!("Could not read {}: {e}", path.display()))
        })?;
        let document = Self::new(bytes, media_type)?;
        Ok(match path.file_name() {
            Some(name) => document.with_name(name.to_string_lossy()),
            None => document,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn exceeds_recommended_size(&self) -> bool {
        self.bytes.len() > RECOMMENDED_MAX_BYTES
    }

    pub fn to_inline_part(&self) -> Part {
        Part::InlineData {
            mime_type: self.media_type.clone(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => PDF_MEDIA_TYPE,
        Some("txt") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
