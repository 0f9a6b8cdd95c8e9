use std::path::Path;

use crate::error::ProcessError;
use crate::processor::PdfTools;

/// Renders a PNG preview of a stored file.
pub struct Thumbnailer {
    pdf_tools: PdfTools,
    width: u32,
}

impl Thumbnailer {
    pub fn new(pdf_tools: PdfTools, width: u32) -> Self {
        Self { pdf_tools, width }
    }

    pub fn supports(mimetype: &str) -> bool {
        mimetype.starts_with("image/") || mimetype == "application/pdf"
    }

    /// Writes the preview of `source` to `target`. Returns `false` without
    /// touching `target` when the mimetype has no preview.
    pub fn generate(
        &self,
        source: &Path,
        mimetype: &str,
        target: &Path,
        scratch: &Path,
    ) -> Result<bool, ProcessError> {
        if !Self::supports(mimetype) {
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProcessError::Scratch {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if mimetype == "application/pdf" {
            let rendered = self.pdf_tools.render_preview(source, self.width, scratch)?;
            std::fs::copy(&rendered, target).map_err(|e| ProcessError::Scratch {
                path: target.to_path_buf(),
                source: e,
            })?;
        } else {
            self.scale_image(source, target)?;
        }

        Ok(true)
    }

    fn scale_image(&self, source: &Path, target: &Path) -> Result<(), ProcessError> {
        let img = image::open(source).map_err(|e| match e {
            image::ImageError::IoError(err) => ProcessError::ReadDocument {
                path: source.to_path_buf(),
                source: err,
            },
            other => ProcessError::ImageProcessing(format!("Failed to load image: {}", other)),
        })?;

        let preview = if img.width() > self.width {
            img.thumbnail(self.width, u32::MAX)
        } else {
            img
        };

        preview
            .save_with_format(target, image::ImageFormat::Png)
            .map_err(|e| ProcessError::ImageProcessing(format!("Failed to write preview: {}", e)))
    }
}
