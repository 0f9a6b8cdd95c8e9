pub mod convert;
pub mod docx;
pub mod image;
pub mod ocr;
pub mod pdf;
pub mod text;
pub mod tool;

use std::path::Path;

use crate::config::Config;
use crate::error::ProcessError;

pub use convert::ConverterExtractor;
pub use docx::DocxExtractor;
pub use image::ImageExtractor;
pub use ocr::OcrEngine;
pub use pdf::{PdfExtractor, PdfTools};
pub use text::TextExtractor;

/// Turns a stored file of one or more mimetypes into plain text.
///
/// `scratch` is a directory owned by the caller for the duration of the call;
/// intermediate files written there are cleaned up with it.
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, mimetype: &str) -> bool;
    fn extract(&self, path: &Path, mimetype: &str, scratch: &Path) -> Result<String, ProcessError>;
}

/// Ordered list of extractors. The first one supporting a mimetype wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    pub fn new(config: &Config) -> Self {
        let tools = &config.tools;
        let ocr = config
            .ocr
            .enabled
            .then(|| OcrEngine::new(&tools.tesseract, &config.ocr.languages));

        let pdf_tools = PdfTools::new(&tools.pdftoppm, &tools.pdfinfo);
        let image = match &ocr {
            Some(ocr) => ImageExtractor::new(ocr.clone()),
            None => ImageExtractor::new_without_ocr(),
        };

        let mut registry = Self::empty();
        registry.register(Box::new(PdfExtractor::new(ocr, pdf_tools, config.ocr.dpi)));
        registry.register(Box::new(DocxExtractor::new()));
        registry.register(Box::new(ConverterExtractor::new(&tools.pandoc)));
        registry.register(Box::new(image));
        registry.register(Box::new(TextExtractor::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    pub fn register(&mut self, extractor: Box<dyn ContentExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn find(&self, mimetype: &str) -> Option<&dyn ContentExtractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(mimetype))
            .map(|e| e.as_ref())
    }

    pub fn extract(
        &self,
        path: &Path,
        mimetype: &str,
        scratch: &Path,
    ) -> Result<String, ProcessError> {
        let extractor = self
            .find(mimetype)
            .ok_or_else(|| ProcessError::UnsupportedFormat(mimetype.to_string()))?;

        tracing::debug!(extractor = extractor.name(), mimetype, "Extracting content");
        extractor.extract(path, mimetype, scratch)
    }
}

/// Cleans extracted text for storage: control characters other than newline
/// and tab are dropped and surrounding whitespace is trimmed.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}
