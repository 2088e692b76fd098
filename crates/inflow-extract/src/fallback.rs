//! Deterministic fallback extraction.
//!
//! Runs when the adaptive path is unavailable, so it must not introduce a
//! second failure mode: it never returns an error, its rules are evaluated
//! in a fixed priority order, the scan length is capped, and every pattern
//! is linear-time. Fields it cannot determine are left absent, never guessed.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use inflow_core::defaults;
use inflow_core::StructuredResult;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)+\b").unwrap()
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?[0-9][0-9 ().\-]{6,18}[0-9]").unwrap());

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap());

static NAME_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:name|candidate)[ \t]*[:\-][ \t]*(.{2,80})$").unwrap());

static ROLE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:role|position|title|applying for)[ \t]*[:\-][ \t]*(.{2,80})$")
        .unwrap()
});

static COMPANY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:company|employer|organization)[ \t]*[:\-][ \t]*(.{2,80})$").unwrap()
});

static LOCATION_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:location|based in|city)[ \t]*[:\-][ \t]*(.{2,80})$").unwrap()
});

/// "Display Name <addr@host>" sender form.
static SENDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^<>]{2,80}?)\s*<\s*([^<>\s]+@[^<>\s]+)\s*>\s*$").unwrap());

/// Caller-supplied context for the fallback rules.
#[derive(Debug, Clone, Default)]
pub struct ExtractionHints {
    /// Subject/title line accompanying the payload.
    pub subject: Option<String>,
    /// Sender, either "Display Name <addr>" or a bare address.
    pub sender: Option<String>,
}

/// Rule-based extractor producing a best-effort subset of the adaptive
/// path's fields.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    max_scan_chars: usize,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self {
            max_scan_chars: defaults::FALLBACK_MAX_SCAN_CHARS,
        }
    }
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the scanned prefix length (chiefly for tests).
    pub fn with_max_scan_chars(mut self, max: usize) -> Self {
        self.max_scan_chars = max.max(1);
        self
    }

    /// Extract whatever the fixed rule list can determine from `text`.
    ///
    /// Never fails; for unusable input the result is empty but valid. The
    /// result is always marked `degraded` since this is the fallback path.
    pub fn extract(&self, text: &str, hints: &ExtractionHints) -> StructuredResult {
        let text = cap_chars(text, self.max_scan_chars);
        let mut result = StructuredResult {
            degraded: true,
            ..Default::default()
        };

        // Rules run in priority order; earlier rules own their field.
        if let Some(m) = EMAIL_RE.find(text) {
            result.email = Some(m.as_str().to_string());
        }
        if let Some(caps) = NAME_LINE_RE.captures(text) {
            result.full_name = non_empty(caps[1].trim());
        }
        if let Some(caps) = ROLE_LINE_RE.captures(text) {
            result.role = non_empty(caps[1].trim());
        }
        if let Some(caps) = COMPANY_LINE_RE.captures(text) {
            result.company = non_empty(caps[1].trim());
        }
        if let Some(caps) = LOCATION_LINE_RE.captures(text) {
            result.location = non_empty(caps[1].trim());
        }
        if let Some(m) = PHONE_RE.find(text) {
            let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
            if (7..=15).contains(&digits) {
                result.phone = Some(m.as_str().trim().to_string());
            }
        }
        for m in URL_RE.find_iter(text).take(8) {
            result.links.push(m.as_str().trim_end_matches('.').to_string());
        }

        // Sender hints fill gaps the body rules left; they never override.
        if let Some(sender) = hints.sender.as_deref() {
            if let Some(caps) = SENDER_RE.captures(sender) {
                if result.full_name.is_none() {
                    result.full_name = non_empty(caps[1].trim());
                }
                if result.email.is_none() {
                    result.email = Some(caps[2].to_string());
                }
            } else if result.email.is_none() && EMAIL_RE.is_match(sender) {
                result.email = EMAIL_RE.find(sender).map(|m| m.as_str().to_string());
            }
        }
        if result.summary.is_none() {
            result.summary = hints.subject.as_deref().and_then(|s| non_empty(s.trim()));
        }

        trace!(
            fields = result.field_count(),
            scanned_chars = text.chars().count(),
            "Fallback extraction finished"
        );
        result
    }
}

/// Truncate to at most `max` characters without splitting a char boundary.
fn cap_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> StructuredResult {
        PatternExtractor::new().extract(text, &ExtractionHints::default())
    }

    #[test]
    fn test_extracts_email_and_phone() {
        let result = extract("Reach Jane at jane.doe@example.com or +1 (555) 010-0199.");
        assert_eq!(result.email.as_deref(), Some("jane.doe@example.com"));
        assert!(result.phone.is_some());
        assert!(result.degraded);
    }

    #[test]
    fn test_extracts_labeled_lines() {
        let text = "Name: Jane Doe\nRole: Backend Engineer\nCompany: Acme Corp\nLocation: Berlin\n";
        let result = extract(text);
        assert_eq!(result.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.role.as_deref(), Some("Backend Engineer"));
        assert_eq!(result.company.as_deref(), Some("Acme Corp"));
        assert_eq!(result.location.as_deref(), Some("Berlin"));
    }

    #[test]
    fn test_extracts_links() {
        let result = extract("Portfolio: https://example.com/jane and https://github.com/janedoe.");
        assert_eq!(result.links.len(), 2);
        assert_eq!(result.links[1], "https://github.com/janedoe");
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let result = extract("Short note with no contact details at all.");
        assert!(result.full_name.is_none());
        assert!(result.email.is_none());
        assert!(result.phone.is_none());
        assert!(result.role.is_none());
        assert!(result.company.is_none());
        assert!(result.location.is_none());
        assert!(result.links.is_empty());
    }

    #[test]
    fn test_empty_input_yields_empty_valid_result() {
        let result = extract("");
        assert!(result.is_empty());
        assert!(result.degraded);
    }

    #[test]
    fn test_binary_garbage_never_panics() {
        let garbage: String = (0u8..=255).cycle().take(4096).map(|b| b as char).collect();
        let result = extract(&garbage);
        // No assertion on fields; the contract is "returns, never raises".
        assert!(result.degraded);
    }

    #[test]
    fn test_long_input_is_capped() {
        let mut text = "x".repeat(200_000);
        text.push_str("\nlate@example.com");
        let result = PatternExtractor::new()
            .with_max_scan_chars(1_000)
            .extract(&text, &ExtractionHints::default());
        // The email sits past the scan cap and must not be found.
        assert!(result.email.is_none());
    }

    #[test]
    fn test_cap_respects_char_boundaries() {
        let text = "é".repeat(100);
        let capped = cap_chars(&text, 10);
        assert_eq!(capped.chars().count(), 10);
    }

    #[test]
    fn test_sender_hint_fills_gaps() {
        let hints = ExtractionHints {
            subject: Some("Application: Backend Engineer".into()),
            sender: Some("Jane Doe <jane@example.com>".into()),
        };
        let result = PatternExtractor::new().extract("No details in the body.", &hints);
        assert_eq!(result.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.email.as_deref(), Some("jane@example.com"));
        assert_eq!(
            result.summary.as_deref(),
            Some("Application: Backend Engineer")
        );
    }

    #[test]
    fn test_body_fields_win_over_hints() {
        let hints = ExtractionHints {
            subject: None,
            sender: Some("Recruiting Bot <bot@agency.example>".into()),
        };
        let result =
            PatternExtractor::new().extract("Name: Jane Doe\njane@example.com", &hints);
        assert_eq!(result.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_phone_digit_count_guard() {
        // Too few digits to be a phone number.
        let result = extract("Order #12-34 shipped");
        assert!(result.phone.is_none());
    }
}
