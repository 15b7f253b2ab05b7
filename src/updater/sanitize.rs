//! Input sanitisation for values written to the content store

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Elements whose content is dropped along with the tags
static DANGEROUS_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed|noscript)\b[^>]*>.*?</\s*(script|style|iframe|object|embed|noscript)\s*>")
        .expect("valid block regex")
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("valid tag regex")
});

static EVENT_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid attribute regex")
});

static SCRIPT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+(href|src)\s*=\s*("\s*(javascript|vbscript|data):[^"]*"|'\s*(javascript|vbscript|data):[^']*'|(javascript|vbscript|data):[^\s>]*)"#)
        .expect("valid url regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static LINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid space regex"));

/// Tags kept in post bodies
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "caption", "cite", "code", "del", "div", "em",
    "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "ins", "li",
    "ol", "p", "pre", "s", "span", "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th",
    "thead", "tr", "u", "ul",
];

fn strip_markup(input: &str) -> String {
    let without_blocks = DANGEROUS_BLOCK.replace_all(input, "");
    let without_comments = COMMENT.replace_all(&without_blocks, "");
    TAG.replace_all(&without_comments, "").into_owned()
}

/// Single-line text: no markup, whitespace collapsed
pub fn text(input: &str) -> String {
    let stripped = strip_markup(input);
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Multi-line text: no markup, line breaks kept
pub fn textarea(input: &str) -> String {
    let stripped = strip_markup(input);
    stripped
        .lines()
        .map(|line| LINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Post body: allow-listed tags only, no event handlers or script URLs
pub fn html(input: &str) -> String {
    let without_blocks = DANGEROUS_BLOCK.replace_all(input, "");
    let without_comments = COMMENT.replace_all(&without_blocks, "");

    TAG.replace_all(&without_comments, |caps: &Captures<'_>| {
        let closing = &caps[1];
        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }
        if !closing.is_empty() {
            return format!("</{}>", name);
        }
        let attrs = EVENT_ATTR.replace_all(&caps[3], "");
        let attrs = SCRIPT_URL.replace_all(&attrs, "");
        format!("<{}{}>", name, attrs)
    })
    .trim()
    .to_string()
}

/// Meta key: lowercase alphanumerics, `_` and `-`
pub fn key(input: &str) -> String {
    input
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

/// Escape text for inclusion in markup
pub fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
