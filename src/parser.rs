use once_cell::sync::Lazy;
use regex::Regex;
use std::num::ParseFloatError;

/// Longest reason kept, in characters
pub const MAX_REASON_CHARS: usize = 150;

/// Appended to a reason that was cut at `MAX_REASON_CHARS`
pub const ELLIPSIS: char = '…';

static SCORE_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\s*"student"\s*:\s*(0(?:\.\d)?|1(?:\.0)?)\s*\}"#).expect("valid score regex")
});

static REASON_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\{\s*"reason"\s*:\s*"((?:[^"\\]|\\.)*)"\s*\}"#).expect("valid reason regex")
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Score and reason pulled out of one judge response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub score: f64,
    pub reason: String,
}

/// How a verdict was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Fragments were scanned successfully; absent fragments took their defaults
    Parsed(Verdict),
    /// Scanning failed and the whole verdict fell back to its default
    Defaulted,
}

impl Extraction {
    pub fn into_verdict(self) -> Verdict {
        match self {
            Extraction::Parsed(verdict) => verdict,
            Extraction::Defaulted => Verdict::default(),
        }
    }
}

/// Extract `(score, reason)` from raw judge output; never fails.
///
/// The judge is asked for two one-line JSON objects but may wrap them in
/// prose, repeat them, or break the punctuation, so the output is scanned for
/// the first well-formed fragment of each kind instead of being deserialized.
pub fn extract(raw: &str) -> (f64, String) {
    let verdict = scan(raw).into_verdict();
    (verdict.score, verdict.reason)
}

/// Scan judge output, reporting whether the defaults had to be used
pub fn scan(raw: &str) -> Extraction {
    match try_scan(raw) {
        Ok(verdict) => Extraction::Parsed(verdict),
        Err(err) => {
            tracing::debug!(error = %err, "judge output could not be parsed, using defaults");
            Extraction::Defaulted
        }
    }
}

fn try_scan(raw: &str) -> Result<Verdict, ParseFloatError> {
    let score = match SCORE_FRAGMENT.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().parse::<f64>()?.clamp(0.0, 1.0),
        None => 0.0,
    };

    let reason = REASON_FRAGMENT
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| normalize_reason(m.as_str()))
        .unwrap_or_default();

    Ok(Verdict { score, reason })
}

/// Collapse whitespace, unescape quotes and cap the length
pub fn normalize_reason(reason: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(reason, " ");
    let unescaped = collapsed.trim().replace("\\\"", "\"").replace("\\'", "'");
    truncate_reason(unescaped)
}

fn truncate_reason(reason: String) -> String {
    match reason.char_indices().nth(MAX_REASON_CHARS) {
        Some((cut, _)) => {
            let mut truncated = reason[..cut].to_string();
            truncated.push(ELLIPSIS);
            truncated
        }
        None => reason,
    }
}

/// Render a verdict in the exact shape the judge is asked to produce
pub fn canonical_form(score: f64, reason: &str) -> String {
    format!(
        "{{\"student\": {:.1}}}\n{{\"reason\": \"{}\"}}",
        score,
        reason.replace('"', "\\\"")
    )
}
