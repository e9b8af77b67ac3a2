//! Entity extraction for accepted leads — budget range, deadline urgency,
//! and contact presence. Runs only after the classifier accepts, feeding
//! the priority computation and the outreach context.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::features::{Urgency, classify_urgency, parse_amount};

/// One amount token with an optional trailing magnitude word:
/// "50", "50k", "100 thousand", "2.5 million".
const AMOUNT_SPAN: &str = r"([\w.,]+(?:\s+(?:thousand|million))?)";

static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)from\s+{AMOUNT_SPAN}\s+(?:to|-)\s+{AMOUNT_SPAN}"
    ))
    .expect("range regex")
});

static RE_UP_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:up to|max(?:imum)?|no more than)\s+{AMOUNT_SPAN}"
    ))
    .expect("up-to regex")
});

static RE_AROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:around|about|approximately|roughly|~)\s+{AMOUNT_SPAN}"
    ))
    .expect("around regex")
});

static RE_BUDGET_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)budget(?:\s+is)?[:\s]+([^\n,;!?]{1,40})").expect("budget label regex")
});

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});

static RE_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d[\d\s()\-]{8,15}\d").expect("phone regex")
});

static RE_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]{5,})").expect("handle regex"));

/// Extracted budget range, in plain units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: f64,
    pub max: f64,
    /// The matched span, for display/debugging.
    pub raw: Option<String>,
}

impl BudgetRange {
    pub fn is_present(&self) -> bool {
        self.max > 0.0
    }
}

/// Contact information found in the text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub handles: Vec<String>,
    pub has_contact: bool,
}

/// Entities extracted from an accepted lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entities {
    pub budget: BudgetRange,
    pub urgency: Urgency,
    pub has_deadline: bool,
    pub contact: ContactInfo,
}

/// Extract all entities from raw text.
pub fn extract(text: &str) -> Entities {
    let lower = text.to_lowercase();
    let urgency = classify_urgency(&lower);

    Entities {
        budget: extract_budget(&lower),
        urgency,
        has_deadline: urgency != Urgency::Normal || mentions_deadline(&lower),
        contact: extract_contact(text),
    }
}

/// Extract a budget range, trying range forms first, then bounded and
/// approximate forms, then a plain labeled amount.
pub fn extract_budget(text_lower: &str) -> BudgetRange {
    if let Some(cap) = RE_RANGE.captures(text_lower)
        && let (Some(min), Some(max)) = (parse_amount(&cap[1]), parse_amount(&cap[2]))
    {
        return BudgetRange {
            min,
            max,
            raw: Some(cap[0].trim().to_string()),
        };
    }

    if let Some(cap) = RE_UP_TO.captures(text_lower)
        && let Some(max) = parse_amount(&cap[1])
    {
        return BudgetRange {
            min: 0.0,
            max,
            raw: Some(cap[0].trim().to_string()),
        };
    }

    if let Some(cap) = RE_AROUND.captures(text_lower)
        && let Some(value) = parse_amount(&cap[1])
    {
        return BudgetRange {
            min: value,
            max: value,
            raw: Some(cap[0].trim().to_string()),
        };
    }

    if let Some(cap) = RE_BUDGET_LABEL.captures(text_lower)
        && let Some(value) = parse_amount(&cap[1])
    {
        return BudgetRange {
            min: value,
            max: value,
            raw: Some(cap[0].trim().to_string()),
        };
    }

    BudgetRange::default()
}

fn mentions_deadline(text_lower: &str) -> bool {
    const MARKERS: [&str; 5] = [
        "deadline",
        "by the end of",
        "this week",
        "by friday",
        "by monday",
    ];
    MARKERS.iter().any(|m| text_lower.contains(m))
}

/// Extract contact details. Handles shorter than five characters are
/// skipped — they are almost always channel tags, not people.
pub fn extract_contact(text: &str) -> ContactInfo {
    let emails: Vec<String> = RE_EMAIL.find_iter(text).map(|m| m.as_str().to_string()).collect();
    let phones: Vec<String> = RE_PHONE.find_iter(text).map(|m| m.as_str().to_string()).collect();
    let handles: Vec<String> = RE_HANDLE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();

    ContactInfo {
        has_contact: !emails.is_empty() || !phones.is_empty() || !handles.is_empty(),
        emails,
        phones,
        handles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_range_from_to() {
        let b = extract_budget("from 50 to 100 thousand for the whole project");
        assert_eq!(b.min, 50.0);
        assert_eq!(b.max, 100_000.0);
    }

    #[test]
    fn budget_range_from_to_with_suffixes() {
        let b = extract_budget("from 50k to 100k");
        assert_eq!(b.min, 50_000.0);
        assert_eq!(b.max, 100_000.0);
    }

    #[test]
    fn budget_up_to() {
        let b = extract_budget("up to 200k, negotiable");
        assert_eq!(b.min, 0.0);
        assert_eq!(b.max, 200_000.0);
    }

    #[test]
    fn budget_around() {
        let b = extract_budget("around 75 thousand");
        assert_eq!(b.min, 75_000.0);
        assert_eq!(b.max, 75_000.0);
    }

    #[test]
    fn budget_labeled() {
        let b = extract_budget("budget 50000, urgent");
        assert_eq!(b.min, 50_000.0);
        assert_eq!(b.max, 50_000.0);
        assert!(b.is_present());
    }

    #[test]
    fn budget_absent() {
        let b = extract_budget("no money mentioned here");
        assert!(!b.is_present());
    }

    #[test]
    fn contact_email_and_handle() {
        let c = extract_contact("write to alice@example.com or @alice_dev");
        assert_eq!(c.emails, vec!["alice@example.com"]);
        assert_eq!(c.handles, vec!["alice_dev"]);
        assert!(c.has_contact);
    }

    #[test]
    fn contact_short_handle_skipped() {
        let c = extract_contact("see @ab for details");
        assert!(c.handles.is_empty());
        assert!(!c.has_contact);
    }

    #[test]
    fn contact_phone() {
        let c = extract_contact("call +1 (555) 123-4567");
        assert_eq!(c.phones.len(), 1);
    }

    #[test]
    fn entities_urgent_lead() {
        let e = extract("Need an SEO specialist, budget 50000, urgent");
        assert_eq!(e.urgency, Urgency::Urgent);
        assert!(e.has_deadline);
        assert_eq!(e.budget.min, 50_000.0);
        assert!(!e.contact.has_contact);
    }

    #[test]
    fn entities_deadline_without_urgency() {
        let e = extract("Landing page needed, deadline next month");
        assert_eq!(e.urgency, Urgency::Normal);
        assert!(e.has_deadline);
    }
}
