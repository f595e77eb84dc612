//! Text sources: the seam between the engine and PDF-to-text conversion.
//!
//! Conversion itself lives outside the engine; the orchestrator only requires
//! a deterministic `bytes -> text` function. Whitespace normalization is
//! applied so repeated conversions of the same document yield identical text.

use crate::exceptions::{ExtractError, ExtractResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Provider of the textual representation of a PDF
pub trait TextSource: Send + Sync {
    /// Convert PDF bytes to text. Must be deterministic; failures surface as
    /// per-item `TextSourceFailure`s.
    fn pdf_to_text(&self, bytes: &[u8]) -> ExtractResult<String>;
}

/// Collapse runs of spaces and tabs, normalize line endings, and trim
/// trailing whitespace per line
pub fn normalize_text(text: &str) -> String {
    static INLINE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("static pattern"));

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .lines()
        .map(|line| INLINE_WS.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Source for inputs whose bytes already are UTF-8 text.
///
/// Used by tests and by callers that run their own converter upstream.
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn pdf_to_text(&self, bytes: &[u8]) -> ExtractResult<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractError::text_source(format!("input is not UTF-8 text: {}", e)))?;
        if text.trim().is_empty() {
            return Err(ExtractError::text_source("document produced no text"));
        }
        Ok(normalize_text(text))
    }
}

/// Source that shells out to an external converter such as `pdftotext`.
///
/// The command receives the PDF on stdin and must print the text to stdout.
pub struct CommandTextSource {
    program: String,
    args: Vec<String>,
}

impl CommandTextSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The conventional `pdftotext - -` invocation
    pub fn pdftotext() -> Self {
        Self::new("pdftotext", vec!["-".to_string(), "-".to_string()])
    }
}

impl TextSource for CommandTextSource {
    fn pdf_to_text(&self, bytes: &[u8]) -> ExtractResult<String> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExtractError::text_source(format!("failed to spawn {}: {}", self.program, e))
            })?;

        child
            .stdin
            .as_mut()
            .ok_or_else(|| ExtractError::text_source("converter stdin unavailable"))?
            .write_all(bytes)
            .map_err(|e| ExtractError::text_source(format!("converter rejected input: {}", e)))?;

        let output = child
            .wait_with_output()
            .map_err(|e| ExtractError::text_source(format!("converter failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::text_source(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        if text.trim().is_empty() {
            return Err(ExtractError::text_source("document produced no text"));
        }
        Ok(normalize_text(&text))
    }
}
