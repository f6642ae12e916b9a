//! Search-string normalization for catalog matching.
//!
//! Source catalogs are full of uploader noise: bracketed tags, ad links,
//! "(320)" bitrate markers, flood separators between artists. Each cleaner
//! here strips a wider class of that noise; `build_search_variants` chains
//! them and yields the queries to try against the destination catalog, in
//! order, until one of them produces a match.
//!
//! All functions are pure. Patterns work within a single line.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::{SearchVariants, Track};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Basic cleanup patterns, applied in order and replaced with nothing.
pub static BASIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bracketed annotations: "[Official Video]", "[2019]"
        Regex::new(r"\[.*\]").unwrap(),
        // Featuring marker: "feat", "Feat."
        Regex::new(r"(?i)\bfeat\b\.?").unwrap(),
        // Ad links
        Regex::new(r"(?i)https?://[^\s\\]*").unwrap(),
        // Social domains without scheme: "vk.com/club123", "t.me/channel"
        Regex::new(r"(?i)(?:vk\.com|vk\.cc|t\.me|youtu\.be|youtube\.com|soundcloud\.com)[^\s\\]*")
            .unwrap(),
        // Useless mix suffix: "(Original Mix)", "original radio mix"
        Regex::new(r"(?i)\(?original.*mix\)?").unwrap(),
        // Bitrate trash marker
        Regex::new(r"\(320\)").unwrap(),
    ]
});

/// Runs of flood separators between artists that must keep a space:
/// " x ", " × ", " & ", " x & ". A whole run collapses to one space.
pub static FLOOD_NEED_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\s(?:x|×|&))+\s").unwrap());

/// Second artist or feat clause: from a comma/dot up to the next dash-like
/// separator followed by whitespace. Only the first occurrence is removed.
pub static SECOND_ARTIST_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,.]\s*[^-—(]*[-—(]+\s+").unwrap());

/// Remaining dash and flood punctuation, removed without replacement.
pub static FLOOD_SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-—×&,~]").unwrap());

/// Any parenthesized or bracketed annotation.
pub static ANY_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.*\)|\[.*\]").unwrap());

// ============================================================================
// CLEANERS
// ============================================================================

/// Strip brackets, feat markers, links, "original mix" suffixes and bitrate
/// markers; collapse flood separators to a single space.
pub fn clean_basic(s: &str) -> String {
    let mut result = s.to_string();
    for pattern in BASIC_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").into_owned();
    }
    result = FLOOD_NEED_SPACE.replace_all(&result, " ").into_owned();

    debug!(target: "normalize", "Clean: BEFORE: {}", s);
    debug!(target: "normalize", "Clean: AFTER:  {}", result);

    result
}

/// Drop the second-artist clause and all remaining dash/flood punctuation.
/// Meant to run on the output of [`clean_basic`].
pub fn clean_hard(s: &str) -> String {
    let without_clause = SECOND_ARTIST_CLAUSE.replace(s, " ");
    let result = FLOOD_SYMBOLS.replace_all(&without_clause, "").into_owned();

    debug!(target: "normalize", "Clean2: BEFORE: {}", s);
    debug!(target: "normalize", "Clean2: AFTER:  {}", result);

    result
}

/// Remove every `(...)` and `[...]` annotation, whatever it says.
pub fn clean_extreme(s: &str) -> String {
    let result = ANY_ANNOTATION.replace_all(s, "").into_owned();

    debug!(target: "normalize", "Clean3: BEFORE: {}", s);
    debug!(target: "normalize", "Clean3: AFTER:  {}", result);

    result
}

/// Search queries for one source track, least aggressive first.
///
/// The first variant is always `clean_basic(search_string)`. Later variants
/// are skipped when they repeat an earlier one or end up blank.
pub fn build_search_variants(track: &Track) -> SearchVariants {
    let basic = clean_basic(&track.search_string);
    let hard = clean_hard(&basic);
    let extreme = clean_extreme(&hard);

    let later = [hard, extreme]
        .into_iter()
        .filter(|variant| !variant.trim().is_empty());

    SearchVariants::from_ordered(std::iter::once(basic).chain(later))
}

// ============================================================================
// TESTS
// ============================================================================
