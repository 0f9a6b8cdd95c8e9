use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::ProcessError;
use crate::processor::ocr::OcrEngine;
use crate::processor::tool::run_tool;
use crate::processor::ContentExtractor;

/// Poppler command-line tools used to inspect and rasterize PDFs.
#[derive(Debug, Clone)]
pub struct PdfTools {
    pdftoppm: String,
    pdfinfo: String,
}

impl PdfTools {
    pub fn new(pdftoppm: &str, pdfinfo: &str) -> Self {
        Self {
            pdftoppm: pdftoppm.to_string(),
            pdfinfo: pdfinfo.to_string(),
        }
    }

    /// Page count reported by `pdfinfo`; 1 if the output has no page line.
    pub fn page_count(&self, pdf: &Path) -> Result<usize, ProcessError> {
        let stdout = run_tool(&self.pdfinfo, [pdf.as_os_str()])?;
        Ok(parse_page_count(&String::from_utf8_lossy(&stdout)).unwrap_or(1))
    }

    /// Renders one page to PNG under `out_dir` and returns the image path.
    pub fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, ProcessError> {
        let prefix = out_dir.join(format!("page-{}", page));
        let page = page.to_string();
        let dpi = dpi.to_string();
        run_tool(
            &self.pdftoppm,
            [
                OsStr::new("-png"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                OsStr::new("-f"),
                OsStr::new(&page),
                OsStr::new("-l"),
                OsStr::new(&page),
                OsStr::new("-singlefile"),
                pdf.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;

        rendered_file(&prefix)
    }

    /// Renders the first page scaled to `width` pixels wide.
    pub fn render_preview(&self, pdf: &Path, width: u32, out_dir: &Path) -> Result<PathBuf, ProcessError> {
        let prefix = out_dir.join("preview");
        let width = width.to_string();
        run_tool(
            &self.pdftoppm,
            [
                OsStr::new("-png"),
                OsStr::new("-f"),
                OsStr::new("1"),
                OsStr::new("-l"),
                OsStr::new("1"),
                OsStr::new("-singlefile"),
                OsStr::new("-scale-to-x"),
                OsStr::new(&width),
                OsStr::new("-scale-to-y"),
                OsStr::new("-1"),
                pdf.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;

        rendered_file(&prefix)
    }
}

fn rendered_file(prefix: &Path) -> Result<PathBuf, ProcessError> {
    let path = prefix.with_extension("png");
    if path.exists() {
        Ok(path)
    } else {
        Err(ProcessError::PdfProcessing(format!(
            "rendered page image '{}' not found",
            path.display()
        )))
    }
}

fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse::<usize>().ok())
}

/// Embedded text via lopdf, with OCR of rendered pages when the text layer
/// is missing or unusable.
pub struct PdfExtractor {
    ocr: Option<OcrEngine>,
    tools: PdfTools,
    dpi: u32,
}

impl PdfExtractor {
    pub fn new(ocr: Option<OcrEngine>, tools: PdfTools, dpi: u32) -> Self {
        Self { ocr, tools, dpi }
    }

    fn ocr_pages(
        &self,
        path: &Path,
        page_count: usize,
        ocr: &OcrEngine,
        scratch: &Path,
    ) -> Result<String, ProcessError> {
        let mut all_text = String::new();
        let mut failures = 0;

        for page in 1..=page_count {
            let recognized = self
                .tools
                .render_page(path, page, self.dpi, scratch)
                .and_then(|image| {
                    let text = ocr.recognize(&image);
                    let _ = std::fs::remove_file(&image);
                    text
                });
            match recognized {
                Ok(text) => {
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(page, error = %e, "OCR of PDF page failed");
                }
            }
        }

        if page_count > 0 && failures == page_count {
            return Err(ProcessError::OcrFailed(format!(
                "no page of {} could be recognized",
                page_count
            )));
        }
        Ok(all_text)
    }
}

impl ContentExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, mimetype: &str) -> bool {
        mimetype == "application/pdf"
    }

    fn extract(&self, path: &Path, _mimetype: &str, scratch: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        let pdf_bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        match lopdf::Document::load_mem(&pdf_bytes) {
            Ok(doc) => {
                let text = extract_text_from_pdf(&doc);
                if !should_use_ocr(&text) {
                    return Ok(text);
                }
                match &self.ocr {
                    Some(ocr) => {
                        let _ocr_span =
                            tracing::info_span!("processor.ocr_fallback", reason = "text_quality")
                                .entered();
                        self.ocr_pages(path, doc.get_pages().len(), ocr, scratch)
                    }
                    None => Ok(text),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "lopdf failed to parse PDF, falling back to OCR");
                let Some(ocr) = &self.ocr else {
                    return Err(ProcessError::PdfProcessing(format!(
                        "Failed to load PDF: {}. OCR fallback unavailable.",
                        e
                    )));
                };
                let _ocr_span =
                    tracing::info_span!("processor.ocr_fallback", reason = "lopdf_parse_failed")
                        .entered();
                let page_count = self.tools.page_count(path)?;
                self.ocr_pages(path, page_count, ocr, scratch)
            }
        }
    }
}

fn extract_text_from_pdf(doc: &lopdf::Document) -> String {
    let mut text = String::new();

    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    text
}

/// Marker lopdf emits for text in CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is accepted regardless of its composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this share of alphanumeric characters the text layer is garbage.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Whether the embedded text is empty, only decoding markers, or garbled.
fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}
