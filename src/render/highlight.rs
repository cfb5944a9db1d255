//! Terminal syntax highlighting.

use std::io::Write;
use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

use crate::error_handling::{ConfigError, RenderError};

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Language of a highlighted body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// JSON
    Json,
    /// XML
    Xml,
    /// HTML
    Html,
}

impl Language {
    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Html => "html",
        }
    }
}

/// Names of the bundled highlighting styles, sorted.
pub fn available_styles() -> Vec<String> {
    THEME_SET.themes.keys().cloned().collect()
}

/// Checks that `name` is a bundled highlighting style.
///
/// # Errors
///
/// Returns `ConfigError::UnknownStyle` otherwise.
pub fn validate_style(name: &str) -> Result<(), ConfigError> {
    if THEME_SET.themes.contains_key(name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownStyle(name.to_string()))
    }
}

fn theme(name: &str) -> Result<&'static Theme, RenderError> {
    THEME_SET
        .themes
        .get(name)
        .ok_or_else(|| RenderError::Highlight(format!("{name}: unknown style")))
}

/// Writes `text` to `out` with 24-bit terminal colors.
///
/// # Errors
///
/// Returns `RenderError::Highlight` if the style or the grammar is missing or
/// the text cannot be parsed, `RenderError::Read` if writing fails.
pub fn highlight(text: &str, language: Language, style: &str, out: &mut dyn Write) -> Result<(), RenderError> {
    let syntax = SYNTAX_SET
        .find_syntax_by_extension(language.extension())
        .ok_or_else(|| RenderError::Highlight(format!("no grammar for {language:?}")))?;
    let mut highlighter = HighlightLines::new(syntax, theme(style)?);
    for line in LinesWithEndings::from(text) {
        let ranges = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| RenderError::Highlight(e.to_string()))?;
        out.write_all(as_24_bit_terminal_escaped(&ranges[..], false).as_bytes())?;
    }
    // Reset colors so the prompt is not painted
    out.write_all(b"\x1b[0m")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STYLE;

    #[test]
    fn test_default_style_is_available() {
        assert!(validate_style(DEFAULT_STYLE).is_ok());
        assert!(available_styles().iter().any(|s| s == DEFAULT_STYLE));
    }

    #[test]
    fn test_unknown_style() {
        assert_eq!(
            validate_style("no-such-style"),
            Err(ConfigError::UnknownStyle("no-such-style".into()))
        );
    }

    #[test]
    fn test_highlight_keeps_text() {
        let mut out = Vec::new();
        highlight("{\n\t\"a\": 1\n}", Language::Json, DEFAULT_STYLE, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[38;2;"));
        assert!(text.contains("\"a\"") || text.contains('a'));
        assert!(text.ends_with("\x1b[0m"));
    }

    #[test]
    fn test_highlight_html_and_xml() {
        for language in [Language::Html, Language::Xml] {
            let mut out = Vec::new();
            highlight("<a>b</a>\n", language, DEFAULT_STYLE, &mut out).unwrap();
            assert!(!out.is_empty());
        }
    }
}
