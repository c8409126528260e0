//! Alias Map — legacy/alternate key spellings → canonical dot-paths.
//!
//! Lookup is case-insensitive and many-to-one: an alias resolves to at most
//! one canonical path, and every canonical path resolves to itself. Keys that
//! resolve to nothing are dropped by canonicalization, silently, so stale
//! producers keep working.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::SCHEMA;

/// Legacy spellings, stored lowercase. Canonical self-mappings are added at
/// map build time from the schema table, not repeated here.
const ALIASES: &[(&str, &str)] = &[
    ("about", "description.summary"),
    ("benefits_list", "benefits"),
    ("city", "location.city"),
    ("company", "company.name"),
    ("company.industry.name", "company.industry"),
    ("company_industry", "company.industry"),
    ("company_name", "company.name"),
    ("company_website", "company.website"),
    ("compensation.min_salary", "compensation.salary_min"),
    ("compensation.max_salary", "compensation.salary_max"),
    ("contact_email", "contact.email"),
    ("contact_phone", "contact.phone"),
    ("country", "location.country"),
    ("currency", "compensation.currency"),
    ("degree", "requirements.education"),
    ("education", "requirements.education"),
    ("email", "contact.email"),
    ("employer", "company.name"),
    ("employment_type", "position.employment_type"),
    ("equity", "compensation.equity_pct"),
    ("experience_years", "requirements.experience_years"),
    ("industry", "company.industry"),
    ("job_title", "position.title"),
    ("languages", "requirements.languages"),
    ("location", "location.city"),
    ("max_salary", "compensation.salary_max"),
    ("min_salary", "compensation.salary_min"),
    ("perks", "benefits"),
    ("phone", "contact.phone"),
    ("remote", "position.remote"),
    ("required_skills", "requirements.skills"),
    ("responsibilities_list", "responsibilities"),
    ("role", "position.title"),
    ("salary_currency", "compensation.currency"),
    ("salary_max", "compensation.salary_max"),
    ("salary_min", "compensation.salary_min"),
    ("salary_period", "compensation.period"),
    ("seniority", "position.seniority"),
    ("seniority_level", "position.seniority"),
    ("skills", "requirements.skills"),
    ("summary", "description.summary"),
    ("tech_stack", "requirements.skills"),
    ("title", "position.title"),
    ("website", "company.website"),
    ("years_of_experience", "requirements.experience_years"),
];

fn alias_map() -> &'static HashMap<String, &'static str> {
    static MAP: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in SCHEMA {
            map.insert(spec.path.to_lowercase(), spec.path);
        }
        for (alias, canonical) in ALIASES {
            let prior = map.insert(alias.to_lowercase(), canonical);
            debug_assert!(
                prior.is_none() || prior == Some(canonical),
                "alias {alias} is ambiguous"
            );
        }
        map
    })
}

fn schema_prefixes() -> &'static HashSet<&'static str> {
    static PREFIXES: OnceLock<HashSet<&'static str>> = OnceLock::new();
    PREFIXES.get_or_init(|| {
        SCHEMA
            .iter()
            .filter_map(|spec| spec.path.split('.').next())
            .collect()
    })
}

/// Resolves a raw key (already flattened to a dotted form) to its canonical
/// dot-path. Falls back to the last dotted segment so producers that wrap
/// known keys in unknown containers (`job.salary_min`) still resolve. The
/// fallback applies only under unknown containers: a key whose first segment
/// is itself a schema prefix addresses a real sub-tree, and an unrecognized
/// leaf there must not jump domains (`company.title` does not become
/// `position.title`).
pub fn resolve(key: &str) -> Option<&'static str> {
    let lowered = key.to_lowercase();
    if let Some(canonical) = alias_map().get(&lowered).copied() {
        return Some(canonical);
    }
    let (first, rest) = lowered.split_once('.')?;
    if schema_prefixes().contains(first) {
        return None;
    }
    rest.rsplit('.')
        .next()
        .and_then(|segment| alias_map().get(segment).copied())
}
