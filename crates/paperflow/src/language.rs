//! Language identification of extracted text.
//!
//! Codes are ISO 639-3 (`eng`, `deu`, `fra`), the same scheme the OCR
//! language list uses.

/// Identifies the dominant language of a text sample.
pub trait LanguageIdentifier: Send + Sync {
    /// ISO 639-3 code, or `None` when the sample is not conclusive.
    fn identify(&self, text: &str) -> Option<String>;
}

/// Trigram based identification via `whatlang`.
#[derive(Debug, Clone, Default)]
pub struct WhatlangIdentifier {
    /// Only reliable detections are reported.
    reliable_only: bool,
}

impl WhatlangIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reliable_only() -> Self {
        Self {
            reliable_only: true,
        }
    }
}

impl LanguageIdentifier for WhatlangIdentifier {
    fn identify(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        if self.reliable_only && !info.is_reliable() {
            return None;
        }
        Some(info.lang().code().to_string())
    }
}

/// Keeps letters and whitespace, collapses whitespace runs to one space and
/// truncates to `max_chars` characters.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let mut cleaned = String::with_capacity(text.len().min(max_chars * 4));
    let mut count = 0;
    let mut pending_space = false;

    for c in text.chars() {
        if count >= max_chars {
            break;
        }
        if c.is_whitespace() {
            pending_space = count > 0;
            continue;
        }
        if !c.is_alphabetic() {
            continue;
        }
        if pending_space {
            cleaned.push(' ');
            count += 1;
            pending_space = false;
            if count >= max_chars {
                break;
            }
        }
        cleaned.push(c);
        count += 1;
    }

    cleaned
}
