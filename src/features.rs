//! Feature normalization — structural signals extracted from raw text.
//!
//! Pure functions, no state. Absent signals yield zero-valued defaults;
//! extraction itself cannot fail.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)>\]]+").expect("url regex"));

static RE_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://([^/\s)>\]]+)").expect("domain regex"));

static RE_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "[\u{1F300}-\u{1F5FF}\u{1F600}-\u{1F64F}\u{1F680}-\u{1F6FF}\u{1F900}-\u{1F9FF}\u{1F1E6}-\u{1F1FF}\u{2702}-\u{27B0}]",
    )
    .expect("emoji regex")
});

static RE_HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag regex"));

static RE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+").expect("mention regex"));

static RE_NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("non-word regex"));

/// Currency-marked amounts: "$500", "1 200 usd", "2.5k eur".
static RE_CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[$€]\s*([\d][\d\s,.]*\s*(?:k|m|thousand|million)?))|(?:\b([\d][\d\s,.]*\s*(?:k|m|thousand|million)?)\s*(?:usd|eur|dollars?|bucks|[$€]))")
        .expect("currency regex")
});

/// Amounts introduced by the budget keyword: "budget 50000", "budget: around 50k".
/// Currency-marked amounts are handled separately, so this stays narrow to
/// avoid double-counting spans like "paying $500".
static RE_BUDGET_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"budget(?:\s+is)?[:\s]+([^\n,;!?$€]{1,40})").expect("budget keyword regex")
});

/// First digit-led amount inside a span, with an optional magnitude suffix.
static RE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)?)\s*(k|m|thousand|million)?\b").expect("amount regex")
});

static RE_THOUSANDS_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)[ ,](\d{3})\b").expect("thousands-sep regex"));

/// Urgency class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// "urgent", "asap", "immediately".
    Urgent,
    /// "today", "tonight", "by end of day".
    Today,
    /// No urgency marker found.
    Normal,
}

impl Urgency {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Today => "today",
            Self::Normal => "normal",
        }
    }
}

/// Structural features of a candidate message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSet {
    pub word_count: usize,
    pub emoji_count: usize,
    /// Emoji per word; spam tends to run high here.
    pub emoji_density: f64,
    /// Uppercase characters over total characters.
    pub caps_ratio: f64,
    pub urls: Vec<String>,
    pub domains: Vec<String>,
    pub hashtags: Vec<String>,
    pub mention_count: usize,
    /// All budget amounts mentioned, normalized to plain units.
    pub budget_values: Vec<f64>,
    pub avg_budget: f64,
    pub has_budget: bool,
    pub urgency: Urgency,
}

impl FeatureSet {
    /// Extract features from raw text.
    pub fn extract(text: &str) -> Self {
        let text_lower = text.to_lowercase();

        let urls: Vec<String> = RE_URL.find_iter(text).map(|m| m.as_str().to_string()).collect();
        let domains: Vec<String> = RE_DOMAIN
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
            .collect();

        let emoji_count = RE_EMOJI.find_iter(text).count();
        let hashtags: Vec<String> = RE_HASHTAG
            .find_iter(&text_lower)
            .map(|m| m.as_str().to_string())
            .collect();
        let mention_count = RE_MENTION.find_iter(text).count();

        let cleaned = RE_NON_WORD.replace_all(&text_lower, "");
        let word_count = cleaned.split_whitespace().count();

        let total_chars = text.chars().count();
        let caps_ratio = if total_chars > 0 {
            text.chars().filter(|c| c.is_uppercase()).count() as f64 / total_chars as f64
        } else {
            0.0
        };

        let budget_values = budget_mentions(&text_lower);
        let avg_budget = if budget_values.is_empty() {
            0.0
        } else {
            budget_values.iter().sum::<f64>() / budget_values.len() as f64
        };

        Self {
            word_count,
            emoji_count,
            emoji_density: if word_count > 0 {
                emoji_count as f64 / word_count as f64
            } else {
                0.0
            },
            caps_ratio,
            urls,
            domains,
            hashtags,
            mention_count,
            has_budget: !budget_values.is_empty(),
            budget_values,
            avg_budget,
            urgency: classify_urgency(&text_lower),
        }
    }
}

/// Classify urgency from marker words.
pub fn classify_urgency(text_lower: &str) -> Urgency {
    const URGENT: [&str; 4] = ["urgent", "asap", "immediately", "right away"];
    const TODAY: [&str; 3] = ["today", "tonight", "by end of day"];

    if URGENT.iter().any(|m| text_lower.contains(m)) {
        Urgency::Urgent
    } else if TODAY.iter().any(|m| text_lower.contains(m)) {
        Urgency::Today
    } else {
        Urgency::Normal
    }
}

/// All budget amounts mentioned in the text: currency-marked numbers plus
/// amounts introduced by a budget keyword (with or without currency).
fn budget_mentions(text_lower: &str) -> Vec<f64> {
    let mut values = Vec::new();

    for cap in RE_CURRENCY_AMOUNT.captures_iter(text_lower) {
        let span = cap
            .get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Some(v) = parse_amount(span) {
            values.push(v);
        }
    }

    for cap in RE_BUDGET_KEYWORD.captures_iter(text_lower) {
        if let Some(v) = parse_amount(&cap[1]) {
            values.push(v);
        }
    }

    values
}

/// Parse a short amount span into plain units.
///
/// Handles digit forms with thousands separators and magnitude suffixes
/// ("50000", "50 000", "50k", "2.5m", "1.2 million") and spelled-out
/// numerals ("fifty thousand", "two hundred", "one and a half" is out of
/// scope — fractional spelled forms are not recognized).
pub fn parse_amount(span: &str) -> Option<f64> {
    let span = span.trim().to_lowercase();

    // Collapse thousands separators: "10 000", "1,200,000".
    let mut normalized = span.clone();
    loop {
        let next = RE_THOUSANDS_SEP.replace_all(&normalized, "$1$2").to_string();
        if next == normalized {
            break;
        }
        normalized = next;
    }

    if let Some(cap) = RE_AMOUNT.captures(&normalized) {
        let number: f64 = cap[1].replace(',', ".").parse().ok()?;
        let multiplier = match cap.get(2).map(|m| m.as_str()) {
            Some("k") | Some("thousand") => 1_000.0,
            Some("m") | Some("million") => 1_000_000.0,
            _ => 1.0,
        };
        return Some(number * multiplier);
    }

    parse_spelled_number(&normalized)
}

/// Parse spelled-out numerals with magnitude words.
///
/// Accumulates unit/ten/hundred words and applies thousand/million
/// multipliers to the running group: "fifty thousand" → 50_000,
/// "two hundred twenty five" → 225.
fn parse_spelled_number(text: &str) -> Option<f64> {
    let mut total = 0.0f64;
    let mut current = 0.0f64;
    let mut saw_number = false;

    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let value = match word {
            "one" => 1.0,
            "two" => 2.0,
            "three" => 3.0,
            "four" => 4.0,
            "five" => 5.0,
            "six" => 6.0,
            "seven" => 7.0,
            "eight" => 8.0,
            "nine" => 9.0,
            "ten" => 10.0,
            "eleven" => 11.0,
            "twelve" => 12.0,
            "thirteen" => 13.0,
            "fourteen" => 14.0,
            "fifteen" => 15.0,
            "sixteen" => 16.0,
            "seventeen" => 17.0,
            "eighteen" => 18.0,
            "nineteen" => 19.0,
            "twenty" => 20.0,
            "thirty" => 30.0,
            "forty" => 40.0,
            "fifty" => 50.0,
            "sixty" => 60.0,
            "seventy" => 70.0,
            "eighty" => 80.0,
            "ninety" => 90.0,
            "hundred" => {
                if current > 0.0 {
                    current *= 100.0;
                } else {
                    current = 100.0;
                }
                saw_number = true;
                continue;
            }
            "thousand" | "k" => {
                current = if current > 0.0 { current } else { 1.0 } * 1_000.0;
                total += current;
                current = 0.0;
                saw_number = true;
                continue;
            }
            "million" | "m" => {
                current = if current > 0.0 { current } else { 1.0 } * 1_000_000.0;
                total += current;
                current = 0.0;
                saw_number = true;
                continue;
            }
            _ => continue,
        };
        current += value;
        saw_number = true;
    }

    total += current;
    if saw_number && total > 0.0 { Some(total) } else { None }
}
