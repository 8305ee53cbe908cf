//! Deterministic clean-up of a translated page.
//!
//! Vision models occasionally wrap the whole answer in a ```` ```markdown ````
//! fence, emit CRLF line endings, or leak zero-width characters copied from
//! the PDF text layer. None of that belongs in the merged document, and none
//! of it changes meaning, so it is removed here instead of in the prompt.
//!
//! Rules, in order:
//! 1. strip one outer code fence (`markdown`, `md` or bare)
//! 2. CRLF / CR to LF
//! 3. drop invisible Unicode (ZWSP, BOM, soft hyphen, joiners)
//! 4. trim trailing whitespace per line
//! 5. insert a missing GFM separator under a table header
//! 6. collapse runs of blank lines to one
//! 7. trim leading and trailing blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every rule to one page of model output.
pub fn clean_translation(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = remove_invisible_chars(&s);
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    let s = add_missing_table_separator(&s);
    let s = RE_BLANK_RUN.replace_all(&s, "\n\n");
    s.trim_matches('\n').to_string()
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// A table whose first row is directly followed by another data row lacks
/// its header separator; insert one sized to the header.
fn add_missing_table_separator(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 2);
    let mut prev_in_table = false;

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());
        let row = is_table_row(line);
        let starts_table = row && !prev_in_table && !is_separator_row(line);
        if starts_table {
            if let Some(next) = lines.get(i + 1) {
                if is_table_row(next) && !is_separator_row(next) {
                    let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                    out.push(format!("|{}", " --- |".repeat(cols)));
                }
            }
        }
        prev_in_table = row;
    }
    out.join("\n")
}
