use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::processor::tool::run_tool;

/// Text recognition through the `tesseract` command.
#[derive(Clone)]
pub struct OcrEngine {
    inner: Arc<OcrEngineInner>,
}

struct OcrEngineInner {
    program: String,
    languages: String,
}

impl OcrEngine {
    pub fn new(program: &str, languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(OcrEngineInner {
                program: program.to_string(),
                languages,
            }),
        }
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    /// Recognizes the text of one image file.
    pub fn recognize(&self, image_path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.ocr").entered();

        if !image_path.exists() {
            return Err(ProcessError::OcrFailed(format!(
                "image '{}' does not exist",
                image_path.display()
            )));
        }

        let stdout = run_tool(
            &self.inner.program,
            [
                image_path.as_os_str(),
                OsStr::new("stdout"),
                OsStr::new("-l"),
                OsStr::new(&self.inner.languages),
            ],
        )?;

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_languages_joined() {
        let engine = OcrEngine::new("tesseract", &["eng".to_string(), "deu".to_string()]);
        assert_eq!(engine.languages(), "eng+deu");
    }

    #[test]
    fn test_default_language() {
        assert_eq!(OcrEngine::new("tesseract", &[]).languages(), "eng");
    }

    #[test]
    fn test_missing_image_error() {
        let engine = OcrEngine::new("tesseract", &[]);
        assert!(matches!(
            engine.recognize(Path::new("/nonexistent/page.png")),
            Err(ProcessError::OcrFailed(_))
        ));
    }

    #[test]
    fn test_missing_program_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page.png");
        std::fs::write(&image, b"png").unwrap();

        let engine = OcrEngine::new("paperflow-missing-tesseract", &[]);
        assert!(matches!(
            engine.recognize(&image),
            Err(ProcessError::ToolMissing { .. })
        ));
    }
}
