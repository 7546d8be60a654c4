// src/spam.rs
// Additive spam scoring over message content and submitter email. Every
// signal is evaluated on every call so the report is complete for audit
// logging even when an early signal already crosses the threshold.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Cumulative score at or above which a submission is classified spam.
pub const SPAM_THRESHOLD: u32 = 50;

const KEYWORD_SCORE: u32 = 20;
const EXCESS_URL_SCORE: u32 = 10;
const SUSPICIOUS_EMAIL_SCORE: u32 = 30;
const CAPS_RATIO_SCORE: u32 = 25;
const XSS_SCORE: u32 = 100;

/// Free links allowed before each additional one starts scoring.
const URL_ALLOWANCE: usize = 2;

/// Distinct keyword categories; each category that matches scores once,
/// however many times it appears.
const SPAM_KEYWORDS: [&str; 12] = [
    "viagra",
    "casino",
    "lottery",
    "prince",
    "inheritance",
    "click here",
    "buy now",
    "limited time",
    "act now",
    "make money fast",
    "work from home",
    "forex",
];

const SUSPICIOUS_EMAIL_FRAGMENTS: [&str; 3] = ["test@test", "spam", "fake"];

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://").unwrap());
static XSS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script|javascript:|\bon[a-z]+\s*=|<iframe|<object|<embed|eval\s*\(|expression\s*\(",
    )
    .unwrap()
});

/// One evaluated signal. Inactive signals stay in the report with a zero
/// score so the audit trail shows what was checked.
#[derive(Debug, Clone, Serialize)]
pub struct SpamSignal {
    pub name: &'static str,
    pub active: bool,
    pub score: u32,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpamReport {
    pub spam: bool,
    pub score: u32,
    pub signals: Vec<SpamSignal>,
}

fn push_signal(signals: &mut Vec<SpamSignal>, name: &'static str, score: u32, detail: String) {
    signals.push(SpamSignal {
        name,
        active: score > 0,
        score,
        detail,
    });
}

/// Score a submission. The submitter must never learn the outcome; callers
/// acknowledge spam identically to ham and diverge only server-side.
pub fn detect_spam(message: &str, email: &str) -> SpamReport {
    let lowered = message.to_lowercase();
    let email_lowered = email.trim().to_lowercase();
    let mut signals = Vec::new();

    let matched: Vec<&str> = SPAM_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lowered.contains(kw))
        .collect();
    push_signal(
        &mut signals,
        "keywords",
        matched.len() as u32 * KEYWORD_SCORE,
        format!("matched: {}", matched.join(", ")),
    );

    let url_count = URL_RE.find_iter(message).count();
    let excess = url_count.saturating_sub(URL_ALLOWANCE);
    push_signal(
        &mut signals,
        "urls",
        excess as u32 * EXCESS_URL_SCORE,
        format!("{} urls, {} over allowance", url_count, excess),
    );

    let fragment = SUSPICIOUS_EMAIL_FRAGMENTS
        .iter()
        .copied()
        .find(|f| email_lowered.contains(f));
    push_signal(
        &mut signals,
        "email",
        if fragment.is_some() {
            SUSPICIOUS_EMAIL_SCORE
        } else {
            0
        },
        fragment
            .map(|f| format!("contains \"{}\"", f))
            .unwrap_or_else(|| "clean".to_string()),
    );

    let letters: Vec<char> = message.chars().filter(|c| c.is_alphabetic()).collect();
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    // Short shouts like "OK!!" are not worth 25 points.
    let shouting = letters.len() >= 10 && upper * 2 > letters.len();
    push_signal(
        &mut signals,
        "caps",
        if shouting { CAPS_RATIO_SCORE } else { 0 },
        format!("{}/{} uppercase letters", upper, letters.len()),
    );

    let xss = XSS_RE.is_match(message);
    push_signal(
        &mut signals,
        "xss",
        if xss { XSS_SCORE } else { 0 },
        if xss {
            "markup or script pattern present".to_string()
        } else {
            "none".to_string()
        },
    );

    let score: u32 = signals.iter().map(|s| s.score).sum();
    SpamReport {
        spam: score >= SPAM_THRESHOLD,
        score,
        signals,
    }
}
