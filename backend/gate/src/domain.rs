//! Domain risk classification by keyword pattern.
//!
//! Regulated domains demand stricter evidence: any non-General domain
//! raises the refuse threshold by 0.10 and the intent minimum by 0.05
//! (intent minimum capped at 0.85).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Risk domain of a query, in descending match priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDomain {
    Finance,
    Security,
    Legal,
    Healthcare,
    General,
}

impl std::fmt::Display for RiskDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskDomain::Finance => "finance",
            RiskDomain::Security => "security",
            RiskDomain::Legal => "legal",
            RiskDomain::Healthcare => "healthcare",
            RiskDomain::General => "general",
        };
        write!(f, "{s}")
    }
}

impl RiskDomain {
    pub fn is_regulated(self) -> bool {
        self != RiskDomain::General
    }

    /// Added to the refuse threshold for this domain.
    pub fn refuse_threshold_bump(self) -> f32 {
        if self.is_regulated() { 0.10 } else { 0.0 }
    }

    /// Apply the domain's intent-minimum adjustment, capped at 0.85.
    pub fn adjust_intent_minimum(self, base: f32) -> f32 {
        if self.is_regulated() { (base + 0.05).min(0.85) } else { base }
    }
}

static DOMAIN_PATTERNS: Lazy<Vec<(RiskDomain, Regex)>> = Lazy::new(|| {
    let compile = |p: &str| Regex::new(&format!("(?i){p}")).expect("domain pattern compiles");
    vec![
        (
            RiskDomain::Finance,
            compile(r"\b(invest(ing|ment)?|stocks?|loans?|tax(es)?|mortgage|portfolio|crypto(currency)?|trading|dividends?|401k|refinanc)\w*"),
        ),
        (
            RiskDomain::Security,
            compile(r"\b(passwords?|vulnerabilit|exploits?|malware|ransomware|encrypt|breach(es)?|firewalls?|phishing|zero.?day)\w*"),
        ),
        (
            RiskDomain::Legal,
            compile(r"\b(lawsuits?|contracts?|liabilit|attorney|lawyer|court|subpoena|gdpr|compliance|copyright|patents?)\w*"),
        ),
        (
            RiskDomain::Healthcare,
            compile(r"\b(diagnos|symptoms?|medicat|dosage|diseases?|treatments?|prescriptions?|side.?effects?|vaccines?)\w*"),
        ),
    ]
});

/// Classify a query into a risk domain; first matching pattern wins.
pub fn classify_domain(query: &str) -> RiskDomain {
    for (domain, pattern) in DOMAIN_PATTERNS.iter() {
        if pattern.is_match(query) {
            return *domain;
        }
    }
    RiskDomain::General
}
