use std::ffi::OsStr;
use std::path::Path;

use crate::error::ProcessError;
use crate::processor::tool::run_tool;
use crate::processor::ContentExtractor;

/// Mimetypes handed to the converter and the reader it should use.
const INPUT_FORMATS: &[(&str, &str)] = &[
    ("text/html", "html"),
    ("application/xhtml+xml", "html"),
    ("text/markdown", "markdown"),
    ("text/x-markdown", "markdown"),
    ("text/x-rst", "rst"),
    ("application/rtf", "rtf"),
    ("text/rtf", "rtf"),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/epub+zip", "epub"),
    ("application/x-latex", "latex"),
    ("application/x-tex", "latex"),
    ("application/docbook+xml", "docbook"),
];

fn input_format(mimetype: &str) -> Option<&'static str> {
    INPUT_FORMATS
        .iter()
        .find(|(m, _)| *m == mimetype)
        .map(|(_, format)| *format)
}

/// Office and markup formats converted to plain text by `pandoc`.
pub struct ConverterExtractor {
    program: String,
}

impl ConverterExtractor {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl ContentExtractor for ConverterExtractor {
    fn name(&self) -> &'static str {
        "converter"
    }

    fn supports(&self, mimetype: &str) -> bool {
        input_format(mimetype).is_some()
    }

    fn extract(&self, path: &Path, mimetype: &str, _scratch: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.convert").entered();

        let mut args = vec![
            OsStr::new("-t"),
            OsStr::new("plain"),
            OsStr::new("--wrap=none"),
        ];
        if let Some(format) = input_format(mimetype) {
            args.push(OsStr::new("-f"));
            args.push(OsStr::new(format));
        }
        args.push(path.as_os_str());

        let stdout = run_tool(&self.program, args)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
