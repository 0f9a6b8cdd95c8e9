use std::path::Path;

use crate::error::ProcessError;
use crate::processor::ocr::OcrEngine;
use crate::processor::ContentExtractor;

/// OCR of raster images. Without an OCR engine images carry no text.
pub struct ImageExtractor {
    ocr: Option<OcrEngine>,
}

impl ImageExtractor {
    pub fn new(ocr: OcrEngine) -> Self {
        Self { ocr: Some(ocr) }
    }

    pub fn new_without_ocr() -> Self {
        Self { ocr: None }
    }
}

impl ContentExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, mimetype: &str) -> bool {
        mimetype.starts_with("image/")
    }

    fn extract(&self, path: &Path, _mimetype: &str, scratch: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.image").entered();

        let Some(ocr) = &self.ocr else {
            return Ok(String::new());
        };

        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(source) => ProcessError::ReadDocument {
                path: path.to_path_buf(),
                source,
            },
            other => ProcessError::ImageProcessing(format!("Failed to load image: {}", other)),
        })?;

        // Normalized to grayscale PNG so the recognizer sees one format.
        let normalized = scratch.join("ocr-input.png");
        img.grayscale()
            .save_with_format(&normalized, image::ImageFormat::Png)
            .map_err(|e| {
                ProcessError::ImageProcessing(format!("Failed to write OCR input: {}", e))
            })?;

        ocr.recognize(&normalized)
    }
}
