//! Output filter pipeline for translated text.
//!
//! Every translated string passes through a pipeline before it is persisted:
//! - html: sanitized with ammonia (providers occasionally mangle markup)
//! - markdown: trimmed only, inline HTML in raw text is left alone
//! - plain: stray markup and LLM-style wrapping quotes removed

use std::sync::LazyLock;

use regex::Regex;

/// Shape of the text sent to and received from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Html,
    Markdown,
    Plain,
}

/// Trait for text filters in the pipeline.
pub trait TextFilter: Send + Sync {
    /// Filter name for debugging.
    fn name(&self) -> &str;

    /// Process the input text and return filtered output.
    fn process(&self, input: &str) -> String;
}

/// Pipeline of text filters applied in sequence.
pub struct FilterPipeline {
    filters: Vec<Box<dyn TextFilter>>,
}

impl FilterPipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the pipeline.
    pub fn add<F: TextFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Create pipeline for a specific format.
    pub fn for_format(format: TextFormat) -> Self {
        match format {
            TextFormat::Html => Self::for_html(),
            TextFormat::Markdown => Self::new().add(TrimFilter),
            TextFormat::Plain => Self::for_text(),
        }
    }

    /// Sanitize markup, then trim.
    pub fn for_html() -> Self {
        Self::new().add(SanitizeHtmlFilter).add(TrimFilter)
    }

    /// Strip markup and wrapping quotes, then trim.
    pub fn for_text() -> Self {
        Self::new()
            .add(StripMarkupFilter)
            .add(TrimFilter)
            .add(UnquoteFilter)
    }

    /// Names of the filters, in order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Process text through all filters in the pipeline.
    pub fn process(&self, input: &str) -> String {
        self.filters
            .iter()
            .fold(input.to_string(), |acc, filter| filter.process(&acc))
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::for_text()
    }
}

/// Sanitize HTML with ammonia's default allowlist.
pub struct SanitizeHtmlFilter;

impl TextFilter for SanitizeHtmlFilter {
    fn name(&self) -> &str {
        "sanitize_html"
    }

    fn process(&self, input: &str) -> String {
        ammonia::clean(input)
    }
}

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^<>]*>").expect("valid regex literal"));

/// Remove tags from text that should be plain.
pub struct StripMarkupFilter;

impl TextFilter for StripMarkupFilter {
    fn name(&self) -> &str {
        "strip_markup"
    }

    fn process(&self, input: &str) -> String {
        TAG_RE.replace_all(input, "").into_owned()
    }
}

/// Trim surrounding whitespace.
pub struct TrimFilter;

impl TextFilter for TrimFilter {
    fn name(&self) -> &str {
        "trim"
    }

    fn process(&self, input: &str) -> String {
        input.trim().to_string()
    }
}

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('「', '」'),
    ('«', '»'),
];

/// Remove one pair of quotes wrapping the whole output.
pub struct UnquoteFilter;

impl TextFilter for UnquoteFilter {
    fn name(&self) -> &str {
        "unquote"
    }

    fn process(&self, input: &str) -> String {
        for (open, close) in QUOTE_PAIRS {
            if let Some(inner) = input
                .strip_prefix(*open)
                .and_then(|s| s.strip_suffix(*close))
                && !inner.contains(*open)
                && !inner.contains(*close)
            {
                return inner.trim().to_string();
            }
        }
        input.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn html_pipeline_strips_scripts() {
        let out = FilterPipeline::for_html().process("  <p>Hallo</p><script>alert(1)</script>\n");
        assert_eq!(out, "<p>Hallo</p>");
    }

    #[test]
    fn html_pipeline_keeps_safe_markup() {
        let out = FilterPipeline::for_html().process("<p><strong>Bonjour</strong> le monde</p>");
        assert_eq!(out, "<p><strong>Bonjour</strong> le monde</p>");
    }

    #[test]
    fn text_pipeline_removes_tags_and_quotes() {
        let pipeline = FilterPipeline::for_text();
        assert_eq!(pipeline.process("\"Hallo Welt\"\n"), "Hallo Welt");
        assert_eq!(pipeline.process("<p>Titel</p>"), "Titel");
        assert_eq!(pipeline.process("「こんにちは」"), "こんにちは");
    }

    #[test]
    fn text_pipeline_keeps_inner_quotes_and_comparisons() {
        let pipeline = FilterPipeline::for_text();
        assert_eq!(pipeline.process("\"a\" and \"b\""), "\"a\" and \"b\"");
        assert_eq!(pipeline.process("1 < 2 > 0"), "1 < 2 > 0");
    }

    #[test]
    fn markdown_is_only_trimmed() {
        let out = FilterPipeline::for_format(TextFormat::Markdown).process(" **fett** <kbd>Strg</kbd>\n");
        assert_eq!(out, "**fett** <kbd>Strg</kbd>");
    }

    #[test]
    fn pipeline_order() {
        assert_eq!(
            FilterPipeline::for_text().names(),
            vec!["strip_markup", "trim", "unquote"]
        );
    }
}
