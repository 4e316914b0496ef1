//! Coercion of untrusted table cells into counts and canonical region names.

use std::sync::LazyLock;

use regex::Regex;

static RE_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{Lu}[\w\s'’.\-]*").expect("invalid regex: region name")
});

enum AliasRule {
    Contains(&'static str),
    Exact(&'static [&'static str]),
}

/// Known source-specific spellings. Matching is case-insensitive and runs on the
/// extracted, whitespace-collapsed name.
const ALIASES: &[(AliasRule, &str)] = &[
    (AliasRule::Contains("china"), "China"),
    (
        AliasRule::Exact(&["usa", "us", "united states of america"]),
        "United States",
    ),
    (AliasRule::Exact(&["uk", "great britain"]), "United Kingdom"),
    (
        AliasRule::Exact(&["republic of korea", "korea"]),
        "South Korea",
    ),
];

/// Parses a count cell such as `"1,234*"`. Anything unparseable reads as zero.
pub fn normalize_count(raw: &str) -> u64 {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '*')).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return 0;
    }

    cleaned.parse().unwrap_or_else(|_| {
        log::debug!("Unparseable count {:?}, using 0", raw);
        0
    })
}

/// Extracts the canonical region name from a raw label, e.g. `"China (total)"` → `"China"`.
pub fn normalize_region(raw: &str) -> Option<String> {
    let extracted = RE_REGION.find(raw).map_or(raw, |m| m.as_str());

    let name = collapse_whitespace(extracted);
    let name = name.trim_end_matches(['.', '-', '\'', '’']).trim_end();

    if name.is_empty() {
        return None;
    }

    Some(apply_alias(name).unwrap_or(name).to_string())
}

/// Identity used when matching regions across snapshots: the canonical name, case-folded.
/// Stored labels that predate normalization still land on the same key.
pub fn region_key(region: &str) -> String {
    normalize_region(region).unwrap_or_default().to_lowercase()
}

fn apply_alias(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    ALIASES
        .iter()
        .find(|(rule, _)| match rule {
            AliasRule::Contains(needle) => lower.contains(needle),
            AliasRule::Exact(names) => names.iter().any(|n| *n == lower),
        })
        .map(|(_, canonical)| *canonical)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
