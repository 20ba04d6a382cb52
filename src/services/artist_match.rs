//! Fuzzy comparison of artist names and recording titles.

use crate::models::fingerprint::ArtistMatch;
use strsim::jaro_winkler;

/// Similarity at or above which two names are treated as the same artist.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

const FEATURING_MARKERS: [&str; 5] = [" feat ", " featuring ", " ft ", " with ", " x "];

/// Lowercase, fold `&` into "and", drop punctuation and a leading "the".
pub fn normalize_name(name: &str) -> String {
    let folded = name.to_lowercase().replace('&', " and ");
    let cleaned: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .strip_prefix("the ")
        .map(str::to_string)
        .unwrap_or(collapsed)
}

/// Main credit only: "Drake feat. Rihanna" compares as "drake".
fn primary_credit(normalized: &str) -> &str {
    FEATURING_MARKERS
        .iter()
        .filter_map(|marker| normalized.find(marker))
        .min()
        .map_or(normalized, |idx| &normalized[..idx])
}

/// Jaro-Winkler similarity of two names after normalization, in `0.0..=1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let full = jaro_winkler(&a, &b);
    let primary = jaro_winkler(primary_credit(&a), primary_credit(&b));
    full.max(primary)
}

/// Compare the declared artist against the artist the catalog returned.
pub fn match_artist(declared: &str, detected: &str, threshold: f64) -> ArtistMatch {
    let confidence = similarity(declared, detected);
    ArtistMatch {
        matched: confidence >= threshold,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_punctuation_and_article() {
        assert_eq!(normalize_name("  The Beatles "), "beatles");
        assert_eq!(normalize_name("Simon & Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize_name("AC/DC"), "ac dc");
    }

    #[test]
    fn identical_names_match_fully() {
        let result = match_artist("Daft Punk", "daft punk", DEFAULT_MATCH_THRESHOLD);
        assert!(result.matched);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn featured_artists_do_not_break_the_match() {
        let result = match_artist("Drake", "Drake feat. Rihanna", DEFAULT_MATCH_THRESHOLD);
        assert!(result.matched);
    }

    #[test]
    fn small_typos_still_match() {
        assert!(match_artist("Beyonce", "Beyoncé", DEFAULT_MATCH_THRESHOLD).matched);
        assert!(match_artist("Radiohed", "Radiohead", DEFAULT_MATCH_THRESHOLD).matched);
    }

    #[test]
    fn different_artists_do_not_match() {
        let result = match_artist("Adele", "Metallica", DEFAULT_MATCH_THRESHOLD);
        assert!(!result.matched);
        assert!(result.confidence < DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn blank_names_never_match() {
        assert_eq!(similarity("", "Adele"), 0.0);
        assert!(!match_artist("   ", "Adele", DEFAULT_MATCH_THRESHOLD).matched);
    }
}
