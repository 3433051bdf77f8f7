//! Sanitizes the free text reviewers and collaborators attach to a task —
//! `suggestions`, `missing_keywords`, `fail` reasons, `complete` notes.
//! A length cap plus a dangerous-pattern blocklist and HTML escape, tuned
//! for short reviewer annotations rather than long-form content.
use crate::error::DispatchError;
use html_escape::encode_text;
use regex::Regex;
use std::collections::HashSet;

/// A single note, reason, or suggestion string is capped well below a
/// typical document-body limit: this core's free text is a short
/// annotation, not an editable document body.
/// Why: 2000 characters comfortably covers a `fail` reason or a `complete`
/// note someone actually types by hand, while still bounding how much text
/// a single field can push through sanitization and into storage.
/// Alternative: 255 (rejected: too tight for a reviewer explaining a
/// multi-part failure reason), 1 MB-scale limits (rejected: this field is
/// an annotation, not a document body, and a huge cap only invites it being
/// used as one).
pub const MAX_NOTE_LENGTH: usize = 2000;

static SAFE_CONTENT_REGEX: &str =
    r"^[a-zA-Z0-9\s\.,!?:;()\[\]{}\-_+=@#$%^&*|\\/<>'`~\n\r\t]+$";

static DANGEROUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "data:text/html",
    "vbscript:",
    "&&",
    "||",
    ";rm",
    ";del",
    "`rm",
    "`del",
    "$(rm",
    "$(del",
    "';",
    "\";",
    "union select",
    "drop table",
    "delete from",
    "../",
    "..\\",
    "file://",
    "/etc/passwd",
    "/etc/shadow",
    "c:\\windows\\system32",
];

/// Sanitizes reviewer-authored strings before they are persisted as task
/// notes, `fail` reasons, or pass-through `suggestions`/`missing_keywords`.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    safe_content_regex: Regex,
    dangerous_patterns: HashSet<String>,
}

impl ContentValidator {
    pub fn new() -> Result<Self, DispatchError> {
        let safe_content_regex = Regex::new(SAFE_CONTENT_REGEX)
            .map_err(|e| DispatchError::Configuration(format!("invalid regex pattern: {e}")))?;
        let dangerous_patterns = DANGEROUS_PATTERNS.iter().map(|s| s.to_lowercase()).collect();
        Ok(Self {
            safe_content_regex,
            dangerous_patterns,
        })
    }

    /// Validates and HTML-escapes a single note/reason/suggestion string.
    /// Empty strings pass through unchanged — an empty `notes` field is not
    /// an error the way an empty top-level task content body would be.
    pub fn sanitize_note(&self, text: &str) -> Result<String, DispatchError> {
        if text.len() > MAX_NOTE_LENGTH {
            return Err(DispatchError::Validation(format!(
                "note exceeds maximum length of {MAX_NOTE_LENGTH} characters"
            )));
        }
        if text.is_empty() {
            return Ok(String::new());
        }

        let lower = text.to_lowercase();
        for pattern in &self.dangerous_patterns {
            if lower.contains(pattern.as_str()) {
                return Err(DispatchError::Validation(
                    "note contains a disallowed pattern".to_string(),
                ));
            }
        }
        if !self.safe_content_regex.is_match(text) {
            return Err(DispatchError::Validation(
                "note contains invalid characters".to_string(),
            ));
        }

        Ok(encode_text(text).to_string())
    }

    pub fn sanitize_notes(&self, texts: Vec<String>) -> Result<Vec<String>, DispatchError> {
        texts.into_iter().map(|t| self.sanitize_note(&t)).collect()
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new().expect("static regex patterns are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_note() {
        let v = ContentValidator::new().unwrap();
        let result = v.sanitize_note("Resume needed a stronger summary section.");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_script_injection() {
        let v = ContentValidator::new().unwrap();
        let result = v.sanitize_note("looks fine <script>alert(1)</script>");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_command_injection() {
        let v = ContentValidator::new().unwrap();
        let result = v.sanitize_note("done && rm -rf /");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_oversized_note() {
        let v = ContentValidator::new().unwrap();
        let long = "x".repeat(MAX_NOTE_LENGTH + 1);
        assert!(v.sanitize_note(&long).is_err());
    }

    #[test]
    fn escapes_html_in_otherwise_safe_text() {
        let v = ContentValidator::new().unwrap();
        let result = v.sanitize_note("candidate & reviewer agreed").unwrap();
        assert_eq!(result, "candidate &amp; reviewer agreed");
    }

    #[test]
    fn empty_note_passes_through() {
        let v = ContentValidator::new().unwrap();
        assert_eq!(v.sanitize_note("").unwrap(), "");
    }
}
