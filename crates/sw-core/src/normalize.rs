//! Language-aware normalization of post-image content.
//!
//! Formatting is mechanical and always succeeds (trailing whitespace, final
//! newline); linting either passes or reports every violation at once so the
//! agent can fix them in a single resubmission. Languages without a
//! registered normalizer pass through untouched.

use crate::error::NormalizationError;
use crate::types::enums::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintViolation {
    /// 1-based line in the post-image.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for LintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub trait Normalizer: Send + Sync {
    /// Rewrites content into canonical form. Must be idempotent.
    fn format(&self, content: &str) -> String;

    /// Checks the formatted content; an empty vec means clean.
    fn lint(&self, content: &str) -> Vec<LintViolation> {
        let _ = content;
        Vec::new()
    }
}

#[derive(Clone, Default)]
pub struct NormalizerRegistry {
    normalizers: BTreeMap<String, Arc<dyn Normalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let whitespace: Arc<dyn Normalizer> = Arc::new(WhitespaceNormalizer);
        for language in [
            Language::Rust,
            Language::Go,
            Language::JavaScript,
            Language::TypeScript,
            Language::Shell,
        ] {
            registry.register(language, Arc::clone(&whitespace));
        }
        registry.register(Language::Python, Arc::new(PythonNormalizer));
        registry.register(Language::Json, Arc::new(JsonNormalizer));
        registry.register(Language::Toml, Arc::new(TomlNormalizer));
        registry
    }

    pub fn register(&mut self, language: Language, normalizer: Arc<dyn Normalizer>) {
        self.normalizers.insert(language.to_string(), normalizer);
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn Normalizer>> {
        self.normalizers.get(&language.to_string())
    }

    /// Formats then lints `content`. Unregistered languages pass through
    /// byte-for-byte.
    pub fn apply(
        &self,
        language: Language,
        content: &str,
    ) -> Result<String, NormalizationError> {
        let Some(normalizer) = self.get(language) else {
            return Ok(content.to_string());
        };
        let formatted = normalizer.format(content);
        let violations = normalizer.lint(&formatted);
        if violations.is_empty() {
            Ok(formatted)
        } else {
            Err(NormalizationError::LintFailed { violations })
        }
    }
}

impl fmt::Debug for NormalizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizerRegistry")
            .field("languages", &self.normalizers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Strips trailing whitespace from every line and guarantees exactly one
/// trailing newline on non-empty content.
pub struct WhitespaceNormalizer;

impl Normalizer for WhitespaceNormalizer {
    fn format(&self, content: &str) -> String {
        strip_trailing_whitespace(content)
    }
}

pub struct PythonNormalizer;

impl Normalizer for PythonNormalizer {
    fn format(&self, content: &str) -> String {
        strip_trailing_whitespace(content)
    }

    fn lint(&self, content: &str) -> Vec<LintViolation> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                line.chars()
                    .take_while(|ch| ch.is_whitespace())
                    .any(|ch| ch == '\t')
            })
            .map(|(index, _)| LintViolation {
                line: index + 1,
                message: "tab character in indentation; use spaces".to_string(),
            })
            .collect()
    }
}

pub struct JsonNormalizer;

impl Normalizer for JsonNormalizer {
    fn format(&self, content: &str) -> String {
        strip_trailing_whitespace(content)
    }

    fn lint(&self, content: &str) -> Vec<LintViolation> {
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(_) => Vec::new(),
            Err(err) => vec![LintViolation {
                line: err.line(),
                message: format!("invalid JSON: {err}"),
            }],
        }
    }
}

pub struct TomlNormalizer;

impl Normalizer for TomlNormalizer {
    fn format(&self, content: &str) -> String {
        strip_trailing_whitespace(content)
    }

    fn lint(&self, content: &str) -> Vec<LintViolation> {
        match content.parse::<toml::Table>() {
            Ok(_) => Vec::new(),
            Err(err) => vec![LintViolation {
                line: err.span().map_or(0, |span| line_of_offset(content, span.start)),
                message: format!("invalid TOML: {err}"),
            }],
        }
    }
}

fn strip_trailing_whitespace(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let mut result: String = content
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    result.push('\n');
    result
}

fn line_of_offset(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())]
        .bytes()
        .filter(|byte| *byte == b'\n')
        .count()
        + 1
}
