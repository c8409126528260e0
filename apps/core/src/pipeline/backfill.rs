//! Heuristic Backfill — deterministic, rule-based last resort.
//!
//! When every transport attempt fails (or validation + repair exhaust), a
//! `RuleExtractor` produces a raw mapping from plain regex/lexicon rules.
//! The result still goes through canonicalization and validation like any
//! other producer; missing required fields are filled from schema defaults
//! so backfill always yields at least a minimal valid profile.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::schema;

/// One rule firing: which canonical path it populated and with what
/// confidence. Surfaced in provenance as `rule_strong` / `rule`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub path: &'static str,
    pub rule_id: &'static str,
    pub score: f64,
}

/// Raw output of a rule-based extraction pass.
#[derive(Debug, Clone)]
pub struct RuleExtraction {
    /// Mapping keyed by canonical dot-paths; re-enters canonicalization
    /// like any untrusted producer output.
    pub raw: Value,
    pub hits: Vec<RuleHit>,
}

/// Contract for the rule-based extractor collaborator. Must be pure and
/// idempotent: the same text always yields the same extraction, so repeated
/// backfill invocations within retries are deterministic.
pub trait RuleExtractor: Send + Sync {
    fn extract(&self, text: &str) -> RuleExtraction;
}

/// Fills missing required fields with their declared schema defaults.
/// Returns the paths that were defaulted, for provenance tagging.
pub fn complete_with_defaults(candidate: &mut BTreeMap<String, Value>) -> Vec<&'static str> {
    let mut defaulted = Vec::new();
    for spec in schema::required_specs() {
        if !candidate.contains_key(spec.path) {
            if let Some(default) = spec.default {
                candidate.insert(spec.path.to_string(), default.to_value());
                defaulted.push(spec.path);
            }
        }
    }
    defaulted
}

// ────────────────────────────────────────────────────────────────────────────
// Default regex-based extractor
// ────────────────────────────────────────────────────────────────────────────

/// Skills spotted by plain substring rules. Ordered; output preserves this
/// order so extraction stays deterministic.
const SKILL_LEXICON: &[&str] = &[
    "Rust",
    "Python",
    "Java",
    "TypeScript",
    "JavaScript",
    "Go",
    "C++",
    "Kubernetes",
    "Docker",
    "Terraform",
    "AWS",
    "PostgreSQL",
    "SQL",
    "Kafka",
    "React",
    "Linux",
    "Git",
];

struct Patterns {
    email: Regex,
    phone: Regex,
    salary_range: Regex,
    experience_years: Regex,
    remote: Regex,
    skill_word: Vec<(&'static str, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        phone: Regex::new(r"\+?\d[\d\s()/\-]{7,}\d").unwrap(),
        salary_range: Regex::new(
            r"(?i)(?P<cur>[$€£])?\s*(?P<min>\d{2,3})[.,]?000\s*(?:-|–|to)\s*[$€£]?\s*(?P<max>\d{2,3})[.,]?000",
        )
        .unwrap(),
        experience_years: Regex::new(r"(?i)(?P<years>\d{1,2})\s*\+?\s*(?:years?|yrs)").unwrap(),
        remote: Regex::new(r"(?i)\bremote\b").unwrap(),
        skill_word: SKILL_LEXICON
            .iter()
            .map(|skill| {
                let escaped = regex::escape(skill);
                (*skill, Regex::new(&format!(r"(?i)(^|[^\w+]){escaped}($|[^\w+])")).unwrap())
            })
            .collect(),
    })
}

/// Default rule-based extractor: email, phone, salary range, experience
/// years, remote keyword, a skill lexicon, and a first-line title heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexExtractor;

impl RuleExtractor for RegexExtractor {
    fn extract(&self, text: &str) -> RuleExtraction {
        let p = patterns();
        let mut raw = Map::new();
        let mut hits = Vec::new();

        if let Some(title) = text.lines().map(str::trim).find(|l| !l.is_empty()) {
            let title: String = title.chars().take(120).collect();
            raw.insert("position.title".to_string(), Value::String(title));
            hits.push(RuleHit {
                path: "position.title",
                rule_id: "title.first_line",
                score: 0.5,
            });
        }

        if let Some(m) = p.email.find(text) {
            raw.insert("contact.email".to_string(), json!(m.as_str()));
            hits.push(RuleHit {
                path: "contact.email",
                rule_id: "contact.email_regex",
                score: 0.95,
            });
        }

        if let Some(m) = p.phone.find(text) {
            raw.insert("contact.phone".to_string(), json!(m.as_str().trim()));
            hits.push(RuleHit {
                path: "contact.phone",
                rule_id: "contact.phone_regex",
                score: 0.7,
            });
        }

        if let Some(caps) = p.salary_range.captures(text) {
            let min = caps.name("min").and_then(|m| m.as_str().parse::<i64>().ok());
            let max = caps.name("max").and_then(|m| m.as_str().parse::<i64>().ok());
            if let (Some(min), Some(max)) = (min, max) {
                raw.insert("compensation.salary_min".to_string(), json!(min * 1000));
                raw.insert("compensation.salary_max".to_string(), json!(max * 1000));
                hits.push(RuleHit {
                    path: "compensation.salary_min",
                    rule_id: "compensation.range_regex",
                    score: 0.85,
                });
                hits.push(RuleHit {
                    path: "compensation.salary_max",
                    rule_id: "compensation.range_regex",
                    score: 0.85,
                });
                if let Some(cur) = caps.name("cur") {
                    let code = match cur.as_str() {
                        "$" => "USD",
                        "€" => "EUR",
                        "£" => "GBP",
                        _ => "other",
                    };
                    raw.insert("compensation.currency".to_string(), json!(code));
                    hits.push(RuleHit {
                        path: "compensation.currency",
                        rule_id: "compensation.currency_symbol",
                        score: 0.85,
                    });
                }
            }
        }

        if let Some(caps) = p.experience_years.captures(text) {
            if let Some(years) = caps.name("years").and_then(|m| m.as_str().parse::<i64>().ok()) {
                raw.insert("requirements.experience_years".to_string(), json!(years));
                hits.push(RuleHit {
                    path: "requirements.experience_years",
                    rule_id: "requirements.years_regex",
                    score: 0.8,
                });
            }
        }

        if p.remote.is_match(text) {
            raw.insert("position.remote".to_string(), json!(true));
            hits.push(RuleHit {
                path: "position.remote",
                rule_id: "position.remote_keyword",
                score: 0.6,
            });
        }

        let skills: Vec<Value> = p
            .skill_word
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(skill, _)| json!(skill))
            .collect();
        if !skills.is_empty() {
            raw.insert("requirements.skills".to_string(), Value::Array(skills));
            hits.push(RuleHit {
                path: "requirements.skills",
                rule_id: "requirements.skill_lexicon",
                score: 0.75,
            });
        }

        RuleExtraction {
            raw: Value::Object(raw),
            hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const AD: &str = "Senior Rust Engineer (Remote)\n\
        Acme builds payment infrastructure in Rust and Kubernetes.\n\
        5+ years experience required. Salary $120,000 - $150,000.\n\
        Apply: jobs@acme.test or +1 415 555 0100.";

    #[test]
    fn test_extracts_title_from_first_line() {
        let extraction = RegexExtractor.extract(AD);
        assert_eq!(
            extraction.raw["position.title"],
            json!("Senior Rust Engineer (Remote)")
        );
    }

    #[test]
    fn test_extracts_email_and_phone() {
        let extraction = RegexExtractor.extract(AD);
        assert_eq!(extraction.raw["contact.email"], json!("jobs@acme.test"));
        assert!(extraction.raw["contact.phone"]
            .as_str()
            .unwrap()
            .starts_with("+1"));
    }

    #[test]
    fn test_extracts_salary_range_with_currency() {
        let extraction = RegexExtractor.extract(AD);
        assert_eq!(extraction.raw["compensation.salary_min"], json!(120000));
        assert_eq!(extraction.raw["compensation.salary_max"], json!(150000));
        assert_eq!(extraction.raw["compensation.currency"], json!("USD"));
    }

    #[test]
    fn test_extracts_experience_years_and_remote() {
        let extraction = RegexExtractor.extract(AD);
        assert_eq!(extraction.raw["requirements.experience_years"], json!(5));
        assert_eq!(extraction.raw["position.remote"], json!(true));
    }

    #[test]
    fn test_skill_lexicon_order_is_stable() {
        let extraction = RegexExtractor.extract(AD);
        assert_eq!(
            extraction.raw["requirements.skills"],
            json!(["Rust", "Kubernetes"])
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let a = RegexExtractor.extract(AD);
        let b = RegexExtractor.extract(AD);
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hits, b.hits);
    }

    #[test]
    fn test_every_hit_names_a_populated_path() {
        let extraction = RegexExtractor.extract(AD);
        for hit in &extraction.hits {
            assert!(
                extraction.raw.get(hit.path).is_some(),
                "hit {} points at missing path",
                hit.rule_id
            );
        }
    }

    #[test]
    fn test_empty_text_extracts_nothing() {
        let extraction = RegexExtractor.extract("");
        assert_eq!(extraction.raw, json!({}));
        assert!(extraction.hits.is_empty());
    }

    #[test]
    fn test_complete_with_defaults_fills_required_paths() {
        let mut candidate = BTreeMap::new();
        candidate.insert("position.title".to_string(), json!("Engineer"));
        let defaulted = complete_with_defaults(&mut candidate);
        assert!(defaulted.contains(&"company.name"));
        assert!(!defaulted.contains(&"position.title"));
        assert_eq!(candidate["company.name"], json!("Unknown company"));
        assert_eq!(candidate["requirements.skills"], json!([]));
        // The completed candidate must validate: that is the backfill guarantee.
        assert!(crate::schema::validate::validate(&candidate).is_ok());
    }
}
