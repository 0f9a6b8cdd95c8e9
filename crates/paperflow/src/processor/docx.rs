use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ProcessError;
use crate::processor::ContentExtractor;

pub const DOCX_MIMETYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Paragraph text of `word/document.xml`.
#[derive(Default)]
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, mimetype: &str) -> bool {
        mimetype == DOCX_MIMETYPE
    }

    fn extract(&self, path: &Path, _mimetype: &str, _scratch: &Path) -> Result<String, ProcessError> {
        let file = std::fs::File::open(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ProcessError::DocxProcessing(format!("Failed to open DOCX: {}", e)))?;

        extract_docx_text(&mut archive)
    }
}

fn extract_docx_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, ProcessError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to read document.xml: {}", e)))?;

    parse_docx_xml(&xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<String, ProcessError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => {
                in_text_element = true;
            }
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => {
                let decoded = e.unescape().unwrap_or_default();
                text.push_str(&decoded);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::DocxProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}
