#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_EXPECTED_LITERAL: &str = "FC-PARSE-001";
pub const ERR_UNEXPECTED_INPUT: &str = "FC-PARSE-002";
pub const ERR_SCRIPT_SYNTAX: &str = "FC-SCRIPT-001";

fn default_hint(code: &str) -> Option<&'static str> {
    match code {
        ERR_EXPECTED_LITERAL => {
            Some("Every element needs a matching closing tag and every `{` a matching `}`.")
        }
        ERR_UNEXPECTED_INPUT => {
            Some("Markup may only contain elements, text, `{expression}` and one <script> block.")
        }
        ERR_SCRIPT_SYNTAX => Some("The embedded script must be a valid ES module."),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// A fatal compilation failure. Compilation is all-or-nothing: when one of
/// these is returned no module text exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub file: String,
    pub offset: u32,
    pub line: u32,
    pub column: u32,
    /// The literal the parser was looking for, for `FC-PARSE-001`.
    pub expected: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            file: file.to_string(),
            offset: offset as u32,
            line,
            column,
            expected: None,
            hints: default_hint(code).map(str::to_string).into_iter().collect(),
        }
    }

    pub fn expected(literal: &str, file: &str, source: &str, offset: usize) -> Self {
        let mut error = Self::new(
            ERR_EXPECTED_LITERAL,
            &format!("Parse error: expected \"{}\" at offset {}", literal, offset),
            file,
            source,
            offset,
        );
        error.expected = Some(literal.to_string());
        error
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let column = source[line_start..offset.max(line_start)].chars().count() as u32 + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let src = "ab\ncd\nef";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 4), (2, 2));
        assert_eq!(line_column(src, 6), (3, 1));
        assert_eq!(line_column(src, 100), (3, 3));
    }

    #[test]
    fn test_expected_carries_literal() {
        let err = CompilerError::expected("</div>", "App.svelte", "<div>", 5);
        assert_eq!(err.code, ERR_EXPECTED_LITERAL);
        assert_eq!(err.expected.as_deref(), Some("</div>"));
        assert_eq!(err.offset, 5);
        assert!(err.to_string().contains("</div>"));
        assert!(!err.hints.is_empty());
    }
}
