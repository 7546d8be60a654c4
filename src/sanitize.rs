// src/sanitize.rs
// Type-directed sanitization of untrusted strings. Every function is total:
// un-sanitizable input degrades to an empty or neutral value instead of an
// error. Each sanitizer is idempotent, so re-sanitizing stored data is safe.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default cap for free-text fields when the schema does not set one.
pub const DEFAULT_TEXT_MAX: usize = 1_000;

/// Declared shape of a field, selecting which sanitizer runs over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeKind {
    Text,
    Html,
    Email,
    Phone,
    Name,
    Url,
    Path,
    Sql,
    Numeric,
    Alphanumeric,
    Json,
}

static SCRIPT_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static SIMPLE_EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static SQL_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|UNION|EXEC|EXECUTE|CREATE|ALTER|TRUNCATE)\b")
        .unwrap()
});

/// Entity pairs shared by the escape and decode paths. `&amp;` is decoded
/// last so nested encodings resolve one level per iteration.
const ENTITIES: [(&str, char); 8] = [
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#x27;", '\''),
    ("&#x2F;", '/'),
    ("&#x60;", '`'),
    ("&#x3D;", '='),
    ("&amp;", '&'),
];

fn decode_entities_once(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, ch) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, &ch.to_string());
        }
    }
    out
}

/// Decode to a fixpoint so layered encodings cannot smuggle markup past a
/// single-pass decoder.
fn decode_entities(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = decode_entities_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Entity-encode the characters with markup significance. Input is decoded
/// first, which keeps repeated escaping from stacking `&amp;amp;` chains.
pub fn escape_html(text: &str) -> String {
    let decoded = decode_entities(text);
    let mut out = String::with_capacity(decoded.len());
    for ch in decoded.chars() {
        match ENTITIES.iter().find(|(_, c)| *c == ch) {
            Some((entity, _)) => out.push_str(entity),
            None => out.push(ch),
        }
    }
    out
}

/// Remove all HTML markup. Script elements go first, content and all, so a
/// split `<scr<script>..</script>ipt>` cannot reassemble after one pass;
/// both removals run to a fixpoint.
pub fn strip_html(text: &str) -> String {
    let mut cleaned = decode_entities(text);
    loop {
        let next = SCRIPT_BLOCK_RE.replace_all(&cleaned, "").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    loop {
        let next = TAG_RE.replace_all(&cleaned, "").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.trim().to_string()
}

/// Free-text sanitizer: strip markup, drop control characters, collapse
/// whitespace, and truncate to `max_length` characters.
pub fn sanitize_text(text: &str, max_length: usize) -> String {
    let cleaned = strip_html(text);
    let cleaned: String = cleaned.chars().filter(|c| !c.is_control()).collect();
    let collapsed = collapse_whitespace(&cleaned);
    let truncated: String = collapsed.chars().take(max_length).collect();
    truncated.trim_end().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Lowercased, trimmed email with angle brackets removed; anything that
/// fails the shape check afterwards degrades to an empty string.
pub fn sanitize_email(email: &str) -> String {
    let cleaned: String = email
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect();
    if SIMPLE_EMAIL_RE.is_match(&cleaned) {
        cleaned
    } else {
        String::new()
    }
}

/// Keep digits and common phone punctuation, drop everything else.
pub fn sanitize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+' | '.'))
        .collect()
}

/// Unicode letters, spaces, hyphens, apostrophes, and periods only, with
/// whitespace runs collapsed.
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\'' | '.'))
        .collect();
    collapse_whitespace(&kept)
}

/// Directory-traversal defense: strips `..` segments, forbidden filename
/// characters, repeated slashes, and a leading slash. Not a canonicalizer.
pub fn sanitize_path(path: &str) -> String {
    let mut cleaned: String = path
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "");
    }
    while cleaned.contains("//") {
        cleaned = cleaned.replace("//", "/");
    }
    cleaned.strip_prefix('/').unwrap_or(&cleaned).to_string()
}

/// Best-effort keyword/comment/quote stripping, run to a fixpoint. Defense
/// in depth only: the persistence boundary must still use parameterized
/// queries.
pub fn escape_sql(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = escape_sql_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn escape_sql_once(text: &str) -> String {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ';' | '\'' | '"' | '`'))
        .collect();
    for seq in ["--", "/*", "*/"] {
        if cleaned.contains(seq) {
            cleaned = cleaned.replace(seq, "");
        }
    }
    SQL_KEYWORD_RE.replace_all(&cleaned, "").into_owned()
}

/// Parse-and-reserialize through a real URL parser; only `http`/`https`
/// survive, and embedded credentials are dropped.
pub fn sanitize_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut parsed) => {
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return String::new();
            }
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => String::new(),
    }
}

pub fn sanitize_numeric(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

pub fn sanitize_alphanumeric(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

/// Parse and re-serialize JSON; malformed input degrades to `{}`.
pub fn sanitize_json(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| serde_json::to_string(&value).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// Dispatch on the declared kind. `Text` uses the default length cap; use
/// [`sanitize_text`] directly for a custom one.
pub fn sanitize(input: &str, kind: SanitizeKind) -> String {
    match kind {
        SanitizeKind::Text => sanitize_text(input, DEFAULT_TEXT_MAX),
        SanitizeKind::Html => escape_html(input),
        SanitizeKind::Email => sanitize_email(input),
        SanitizeKind::Phone => sanitize_phone(input),
        SanitizeKind::Name => sanitize_name(input),
        SanitizeKind::Url => sanitize_url(input),
        SanitizeKind::Path => sanitize_path(input),
        SanitizeKind::Sql => escape_sql(input),
        SanitizeKind::Numeric => sanitize_numeric(input),
        SanitizeKind::Alphanumeric => sanitize_alphanumeric(input),
        SanitizeKind::Json => sanitize_json(input),
    }
}

/// One field of an object-level sanitization schema, keyed by dot-path.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeRule {
    pub field: &'static str,
    pub kind: SanitizeKind,
    pub max_length: Option<usize>,
}

/// Apply a schema over a flattened (dot-path keyed) object. Fields absent
/// from the input are skipped; fields absent from the schema are dropped —
/// unknown incoming data never passes through unsanitized. Nested
/// reconstruction is the caller's job.
pub fn sanitize_object(
    values: &BTreeMap<String, String>,
    schema: &[SanitizeRule],
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for rule in schema {
        if let Some(raw) = values.get(rule.field) {
            let cleaned = match (rule.kind, rule.max_length) {
                (SanitizeKind::Text, Some(max)) => sanitize_text(raw, max),
                (kind, _) => sanitize(raw, kind),
            };
            out.insert(rule.field.to_string(), cleaned);
        }
    }
    out
}
