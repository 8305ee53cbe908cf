//! Cross-page continuity: derive a short hint from the previous page.
//!
//! Vision models translate each page image in isolation, so a sentence that
//! straddles a page break gets translated twice or not at all. Feeding the
//! last couple of sentences of the previous page's translation into the next
//! prompt lets the model pick up mid-sentence.

use crate::config::TranslatorConfig;
use crate::prompts::{
    is_error_placeholder, DEFAULT_CONTEXT_TEMPLATE, DEFAULT_USER_PROMPT_TEMPLATE,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// One sentence-like unit: a run of non-terminal characters plus its
/// terminator, if any.
static RE_SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?。！？]+[.!?。！？]*").unwrap());

const TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Extract the final `k` sentence-like units of `text`.
///
/// Lines are joined with spaces, then the text is segmented on `.`, `!`,
/// `?` and their full-width forms. Blank fragments and bare punctuation are
/// dropped. When fewer than `k` fragments exist, all of them are returned;
/// an empty or blank input yields an empty string. Never fails.
pub fn last_sentences(text: &str, k: usize) -> String {
    if k == 0 {
        return String::new();
    }

    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let fragments: Vec<&str> = RE_SENTENCE
        .find_iter(&joined)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.trim_matches(TERMINATORS).trim().is_empty())
        .collect();

    let start = fragments.len().saturating_sub(k);
    fragments[start..].join(" ")
}

/// Builds the per-page user prompt.
#[derive(Debug, Clone)]
pub struct PageContextBuilder {
    sentences: usize,
    user_template: String,
    context_template: String,
}

impl Default for PageContextBuilder {
    fn default() -> Self {
        Self {
            sentences: 2,
            user_template: DEFAULT_USER_PROMPT_TEMPLATE.to_string(),
            context_template: DEFAULT_CONTEXT_TEMPLATE.to_string(),
        }
    }
}

impl PageContextBuilder {
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self {
            sentences: config.context_sentences,
            user_template: config
                .user_prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_PROMPT_TEMPLATE.to_string()),
            context_template: config
                .context_template
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTEXT_TEMPLATE.to_string()),
        }
    }

    /// Continuation hint for the page following `previous`.
    ///
    /// A failure placeholder carries no content and yields no hint.
    pub fn hint(&self, previous: Option<&str>) -> String {
        match previous {
            Some(prev) if !is_error_placeholder(prev) => last_sentences(prev, self.sentences),
            _ => String::new(),
        }
    }

    /// Render the user prompt for 1-based page `page_num`.
    pub fn prompt(&self, page_num: usize, previous: Option<&str>) -> String {
        let hint = self.hint(previous);
        let instruction = if hint.is_empty() {
            String::new()
        } else {
            self.context_template.replace("{prev_context}", &hint)
        };
        self.user_template
            .replace("{page_num}", &page_num.to_string())
            .replace("{context_instruction}", &instruction)
    }
}
