use std::path::{Path, PathBuf};

use pdfium_render::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to bind to pdfium library: {0}")]
    Bind(String),

    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("failed to read text of page {page}: {reason}")]
    PageText { page: usize, reason: String },
}

/// Turns a document on disk into plain text.
pub trait DocumentExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// PDF text extraction through the pdfium shared library.
pub struct PdfiumExtractor {
    library: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractError::Bind(e.to_string()))?;

        Ok(Pdfium::new(bindings))
    }
}

impl DocumentExtractor for PdfiumExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::Load {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| ExtractError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut text = String::new();
        for (index, page) in document.pages().iter().enumerate() {
            let page_text = page.text().map_err(|e| ExtractError::PageText {
                page: index + 1,
                reason: e.to_string(),
            })?;
            text.push_str(&page_text.all());
            text.push('\n');
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_load_error() {
        let extractor = PdfiumExtractor::new(None);
        let err = extractor
            .extract_text(Path::new("does/not/exist.pdf"))
            .unwrap_err();

        assert!(matches!(err, ExtractError::Load { .. }));
        assert!(err.to_string().contains("exist.pdf"));
    }

    #[test]
    fn test_bad_library_path_is_bind_error() {
        let extractor = PdfiumExtractor::new(Some(PathBuf::from("/nonexistent/libpdfium.so")));
        let err = extractor.extract_text(Path::new("Cargo.toml")).unwrap_err();

        assert!(matches!(err, ExtractError::Bind(_)));
    }
}
