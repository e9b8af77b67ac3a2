//! Stage 7 — deep model-backed analysis.
//!
//! Builds the structured prompt for borderline candidates and defensively
//! parses the model's JSON verdict. Models wrap JSON in markdown or prose
//! often enough that extraction tries several shapes before giving up;
//! parse failure falls back to the conservative default at the call site.

use serde::{Deserialize, Serialize};

use crate::features::FeatureSet;

/// Role the model assigns to the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Client,
    Freelancer,
    Spam,
    Recruiter,
    Unknown,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Freelancer => "FREELANCER",
            Self::Spam => "SPAM",
            Self::Recruiter => "RECRUITER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Parsed structured verdict from the model.
#[derive(Debug, Clone)]
pub struct DeepVerdict {
    pub is_lead: bool,
    pub role: Role,
    pub confidence: f32,
    pub reason: String,
    pub red_flags: Vec<String>,
}

/// System prompt for the deep analysis call.
pub fn build_system_prompt() -> String {
    "You are an expert lead filter for a digital-marketing practice. \
     Respond with valid JSON only."
        .to_string()
}

/// User prompt with the candidate text and the signals gathered so far.
pub fn build_user_prompt(text: &str, features: &FeatureSet, score: i32) -> String {
    let preview: String = text.chars().take(800).collect();
    format!(
        "Analyze this message from a freelance community feed.\n\n\
         CONTEXT:\n\
         - Heuristic score: {score}\n\
         - Length: {} words\n\
         - Budget mentioned: {}\n\n\
         CRITERIA for is_lead = true:\n\
         1. The author is a CLIENT looking for a contractor\n\
         2. Vertical: SEO, search ads, marketplace listings, web development\n\
         3. There is a task description or a concrete question\n\
         4. No signs of: service offers, resumes, portfolios\n\n\
         CRITERIA for is_lead = false:\n\
         - The author OFFERS services (freelancer, agency, \"I am a specialist\")\n\
         - Scam (\"earn $X per day\", pyramid schemes)\n\
         - Penny tasks (reviews, likes, subscriptions)\n\
         - Staff vacancy (\"join our team\", \"we are hiring\")\n\
         - Course or training advertising\n\
         - Unserviced vertical\n\n\
         MESSAGE:\n---\n{preview}\n---\n\n\
         Answer STRICTLY in JSON:\n\
         {{\"is_lead\": true/false, \"role\": \"CLIENT\"/\"FREELANCER\"/\"SPAM\"/\"RECRUITER\", \
         \"confidence\": 0.0-1.0, \"reason\": \"one sentence\", \"red_flags\": [\"...\"]}}",
        features.word_count,
        if features.has_budget {
            format!("{:.0}", features.avg_budget)
        } else {
            "none".to_string()
        },
    )
}

/// Raw JSON shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct DeepResponse {
    is_lead: bool,
    #[serde(default)]
    role: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    red_flags: Vec<String>,
}

/// Parse the model output into a `DeepVerdict`.
pub fn parse_deep_response(raw: &str) -> Result<DeepVerdict, String> {
    let json_str = extract_json_object(raw);
    let response: DeepResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let role = match response.role.to_uppercase().as_str() {
        "CLIENT" => Role::Client,
        "FREELANCER" => Role::Freelancer,
        "SPAM" => Role::Spam,
        "RECRUITER" => Role::Recruiter,
        _ => Role::Unknown,
    };

    Ok(DeepVerdict {
        is_lead: response.is_lead,
        role,
        confidence: response.confidence.clamp(0.0, 1.0),
        reason: if response.reason.is_empty() {
            "no reason given".to_string()
        } else {
            response.reason
        },
        red_flags: response.red_flags,
    })
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a ```json block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Wrapped in a bare ``` block
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Object bounds inside prose
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
