//! Text heuristics feeding the emergence engine: element detection, domain and
//! query categorisation, and wisdom fragment extraction.

use once_cell::sync::Lazy;
use regex::Regex;

/// Keyword sets that pull an element into an interaction's element set.
const ELEMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("fire", &["ignite", "spark", "vision", "passion", "catalyze", "transform"]),
    ("water", &["flow", "emotion", "depth", "healing", "intuition", "feel"]),
    ("earth", &["ground", "foundation", "stable", "manifest", "practical", "material"]),
    ("air", &["clarity", "thought", "perspective", "insight", "communicate", "understand"]),
    ("aether", &["unity", "integrate", "wholeness", "spirit", "transcend", "weave"]),
    ("shadow", &["darkness", "unconscious", "pattern", "hidden", "integrate", "face"]),
];

/// A secondary element needs at least this many keyword hits.
const MIN_KEYWORD_HITS: usize = 2;

/// Checked in order; the first domain with a matching keyword wins.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("relationships", &["relationship", "love"]),
    ("career", &["work", "career"]),
    ("purpose", &["purpose", "meaning"]),
    ("healing", &["heal", "trauma"]),
    ("spirituality", &["spiritual", "soul"]),
    ("creativity", &["creative", "art"]),
    ("abundance", &["money", "abundance"]),
];

static WISDOM_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)when (.+?) meets (.+?), (.+)",
        r"(?i)the key is (.+)",
        r"(?i)remember that (.+)",
        r"(?i)(.+) creates (.+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static QUERY_CATEGORIES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("question", r"(?i)^(what|who|where|when|why|how|is|are|can|will|should)"),
        ("request", r"(?i)(help|guide|show|teach|explain)"),
        ("reflection", r"(?i)(feel|think|wonder|realize|understand)"),
        ("intention", r"(?i)(want|need|wish|hope|plan)"),
        ("problem", r"(?i)(stuck|confused|lost|struggling|difficult)"),
    ]
    .into_iter()
    .filter_map(|(name, p)| Regex::new(p).ok().map(|re| (name, re)))
    .collect()
});

const FALLBACK_WISDOM: &str = "Pattern emerging from collective experience";

/// The primary element plus every element whose keywords appear at least
/// twice in the combined response and query. Insertion order, no duplicates.
pub fn extract_elements(primary: &str, query: &str, response: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let primary = primary.trim();
    if !primary.is_empty() {
        elements.push(primary.to_lowercase());
    }

    let content = format!("{response} {query}").to_lowercase();
    for (element, keywords) in ELEMENT_KEYWORDS {
        let hits = keywords.iter().filter(|k| content.contains(*k)).count();
        if hits >= MIN_KEYWORD_HITS && !elements.iter().any(|e| e == element) {
            elements.push((*element).to_string());
        }
    }
    elements
}

/// Candidate key: sorted, deduplicated elements joined with `-`.
pub fn candidate_key(elements: &[String]) -> (Vec<String>, String) {
    let mut sorted = elements.to_vec();
    sorted.sort();
    sorted.dedup();
    let key = sorted.join("-");
    (sorted, key)
}

pub fn infer_domain(query: &str) -> &'static str {
    let query = query.to_lowercase();
    DOMAIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| query.contains(k)))
        .map_or("general", |(domain, _)| *domain)
}

pub fn categorize_query(query: &str) -> &'static str {
    QUERY_CATEGORIES
        .iter()
        .find(|(_, re)| re.is_match(query))
        .map_or("general", |(name, _)| *name)
}

/// First template phrase found in `response`, as written.
pub fn extract_wisdom(response: &str) -> Option<String> {
    WISDOM_PHRASES
        .iter()
        .find_map(|re| re.find(response))
        .map(|m| m.as_str().trim().to_string())
}

/// Merge collected fragments into a single integration statement.
pub fn synthesize_wisdom(fragments: &[String]) -> String {
    let mut unique: Vec<&str> = Vec::new();
    for fragment in fragments {
        if !unique.contains(&fragment.as_str()) {
            unique.push(fragment);
        }
    }
    match unique.as_slice() {
        [] => FALLBACK_WISDOM.to_string(),
        [only] => (*only).to_string(),
        many => format!(
            "Integration insight: {}",
            many.iter().take(3).copied().collect::<Vec<_>>().join("; ")
        ),
    }
}
