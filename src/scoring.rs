//! Candidate selection for destination-catalog search results.
//!
//! This module contains both selection strategies:
//! - Exact/remix-aware selection, which trusts the catalog's ranking
//! - Fuzzy selection, which scores candidates against the source string and
//!   breaks ties on duration
//!
//! Neither strategy mutates its inputs or fails; "no match" is `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::models::{MatchCandidate, Track};

// ============================================================================
// Thresholds
// ============================================================================

/// Candidates scoring above this are not considered a match at all.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

// ============================================================================
// Regex Patterns
// ============================================================================

/// Remix keyword with the text around it. Greedy, so the last keyword in the
/// title splits it.
pub static REMIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*)(?:remix|edit|flip)(.*)$").unwrap());

// ============================================================================
// Strategy
// ============================================================================

/// Options for the fuzzy strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuzzyOptions {
    /// Highest score (0.0 = identical, 1.0 = nothing in common) still
    /// treated as a candidate.
    pub threshold: f64,
    pub ignore_case: bool,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FUZZY_THRESHOLD,
            ignore_case: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SelectStrategy {
    Simple { remix_only: bool },
    Fuzzy(FuzzyOptions),
}

impl Default for SelectStrategy {
    fn default() -> Self {
        SelectStrategy::Simple { remix_only: false }
    }
}

impl SelectStrategy {
    pub fn select<'a>(&self, source: &Track, candidates: &'a [Track]) -> Option<&'a Track> {
        match self {
            SelectStrategy::Simple { remix_only } => select_simple(source, candidates, *remix_only),
            SelectStrategy::Fuzzy(options) => select_fuzzy(source, candidates, options),
        }
    }
}

// ============================================================================
// Exact / Remix-aware Selection
// ============================================================================

fn trim_remix_context(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '-' | '–' | '—')
    })
}

/// Text before and after the remix keyword in `title`, trimmed of spaces,
/// brackets and dashes. `None` when the title has no remix keyword.
pub fn remix_context(title: &str) -> Option<(String, String)> {
    let caps = REMIX_PATTERN.captures(title)?;
    let left = caps.get(1).map_or("", |m| trim_remix_context(m.as_str()));
    let right = caps.get(2).map_or("", |m| trim_remix_context(m.as_str()));
    Some((left.to_string(), right.to_string()))
}

fn find_containing<'a>(needle: &str, candidates: &'a [Track]) -> Option<&'a Track> {
    if needle.is_empty() {
        return None;
    }
    candidates.iter().find(|track| {
        let found = track.search_string.contains(needle);
        if found {
            trace!(target: "select", "Remix found: {} === {}", needle, track.search_string);
        }
        found
    })
}

fn check_remixes<'a>(source: &Track, candidates: &'a [Track]) -> Option<&'a Track> {
    let (left, right) = remix_context(&source.title)?;

    let result = find_containing(&left, candidates).or_else(|| find_containing(&right, candidates));
    if result.is_none() {
        debug!(target: "select", "Empty remix check! {}", source.search_string);
    }
    result
}

/// Pick the candidate matching the source's remix context, else the first
/// candidate (unless `remix_only`).
pub fn select_simple<'a>(
    source: &Track,
    candidates: &'a [Track],
    remix_only: bool,
) -> Option<&'a Track> {
    if candidates.is_empty() {
        return None;
    }

    let remix = check_remixes(source, candidates);
    if remix_only {
        return remix;
    }

    remix.or_else(|| candidates.first())
}

// ============================================================================
// Fuzzy Selection
// ============================================================================

/// Distance between two search strings: 0.0 for identical, 1.0 for nothing
/// in common.
pub fn fuzzy_score(query: &str, candidate: &str, ignore_case: bool) -> f64 {
    let similarity = if ignore_case {
        strsim::normalized_levenshtein(&query.to_lowercase(), &candidate.to_lowercase())
    } else {
        strsim::normalized_levenshtein(query, candidate)
    };
    1.0 - similarity
}

/// Score every candidate against the source, keeping those within the
/// threshold, in input order.
pub fn rank_fuzzy<'a>(
    source: &Track,
    candidates: &'a [Track],
    options: &FuzzyOptions,
) -> Vec<MatchCandidate<'a>> {
    candidates
        .iter()
        .filter_map(|track| {
            let score = fuzzy_score(
                &source.search_string,
                &track.search_string,
                options.ignore_case,
            );
            (score <= options.threshold).then_some(MatchCandidate {
                track,
                score: Some(score),
            })
        })
        .collect()
}

/// Pick the lowest-scoring candidate; among ties, the one whose duration is
/// closest to the source's (earliest wins on equal distance).
pub fn select_fuzzy<'a>(
    source: &Track,
    candidates: &'a [Track],
    options: &FuzzyOptions,
) -> Option<&'a Track> {
    let ranked = rank_fuzzy(source, candidates, options);

    let best = ranked
        .iter()
        .filter_map(|candidate| candidate.score)
        .fold(None, |best: Option<f64>, score| {
            Some(best.map_or(score, |b| b.min(score)))
        });

    let Some(best) = best else {
        debug!(target: "select", "No results for {}", source.search_string);
        return None;
    };

    let ties: Vec<&Track> = ranked
        .iter()
        .filter(|candidate| candidate.score == Some(best))
        .map(|candidate| candidate.track)
        .collect();

    let selected = if ties.len() > 1 {
        debug!(target: "select", "{} candidates tied at score {:.3}", ties.len(), best);
        let mut closest = ties[0];
        let mut closest_diff = closest.duration_ms.abs_diff(source.duration_ms);
        for &track in ties.iter().skip(1) {
            let diff = track.duration_ms.abs_diff(source.duration_ms);
            if diff < closest_diff {
                closest = track;
                closest_diff = diff;
            }
        }
        closest
    } else {
        ties[0]
    };

    debug!(target: "select", "Add track: {}", selected.search_string);
    Some(selected)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(search_string: &str, duration_ms: u64) -> Track {
        Track {
            search_string: search_string.to_string(),
            artist: String::new(),
            title: String::new(),
            duration_ms,
            id: Some(format!("id:{}:{}", search_string, duration_ms)),
        }
    }

    fn source(title: &str, duration_ms: u64) -> Track {
        Track::new("Artist", title, duration_ms)
    }

    #[test]
    fn test_remix_context() {
        assert_eq!(
            remix_context("Song (Club Remix)"),
            Some(("Song (Club".to_string(), String::new()))
        );
        assert_eq!(
            remix_context("Song [Radio Edit] Extended"),
            Some(("Song [Radio".to_string(), "Extended".to_string()))
        );
        assert_eq!(remix_context("Song"), None);
    }

    #[test]
    fn test_select_simple_empty() {
        assert!(select_simple(&source("Song", 1), &[], false).is_none());
        assert!(select_simple(&source("Song (Remix)", 1), &[], true).is_none());
    }

    #[test]
    fn test_select_simple_matches_remix_context() {
        let mut track = source("Song", 200_000);
        track.title = "Artist - Song (Remix)".to_string();
        let candidates = vec![
            candidate("Other - X", 200_000),
            candidate("Artist - Song Remix Version", 200_000),
        ];
        let selected = select_simple(&track, &candidates, false).unwrap();
        assert_eq!(selected.search_string, "Artist - Song Remix Version");
    }

    #[test]
    fn test_select_simple_right_context() {
        let track = source("Remix by Someone", 200_000);
        let candidates = vec![
            candidate("Artist - Song", 200_000),
            candidate("Artist - Song (by Someone)", 200_000),
        ];
        let selected = select_simple(&track, &candidates, false).unwrap();
        assert_eq!(selected.search_string, "Artist - Song (by Someone)");
    }

    #[test]
    fn test_select_simple_falls_back_to_first() {
        let track = source("Song", 200_000);
        let candidates = vec![candidate("Artist - Song", 1), candidate("Artist - Song 2", 2)];
        let selected = select_simple(&track, &candidates, false).unwrap();
        assert_eq!(selected.duration_ms, 1);
    }

    #[test]
    fn test_select_simple_remix_only() {
        let track = source("Song (VIP Edit)", 200_000);
        let candidates = vec![candidate("Artist - Other Song", 1)];
        assert!(select_simple(&track, &candidates, true).is_none());
        assert!(select_simple(&track, &candidates, false).is_some());

        let plain = source("Song", 200_000);
        assert!(select_simple(&plain, &candidates, true).is_none());
    }

    #[test]
    fn test_select_simple_is_case_sensitive() {
        let track = source("Song Flip", 200_000);
        let candidates = vec![
            candidate("artist - song flip", 1),
            candidate("Artist - Song Flip", 2),
        ];
        let selected = select_simple(&track, &candidates, true).unwrap();
        assert_eq!(selected.duration_ms, 2);
    }

    #[test]
    fn test_fuzzy_score() {
        assert_eq!(fuzzy_score("abc", "abc", false), 0.0);
        assert_eq!(fuzzy_score("ABC", "abc", true), 0.0);
        assert_eq!(fuzzy_score("ABC", "abc", false), 1.0);
        assert!(fuzzy_score("Artist - Song", "Artist - Sang", true) < 0.2);
    }

    #[test]
    fn test_select_fuzzy_empty() {
        let options = FuzzyOptions::default();
        assert!(select_fuzzy(&source("Song", 1), &[], &options).is_none());
    }

    #[test]
    fn test_select_fuzzy_nothing_within_threshold() {
        let options = FuzzyOptions::default();
        let candidates = vec![candidate("zzzzzzzzzzzzzzzzzzzzzzzz", 1)];
        assert!(select_fuzzy(&source("Song", 1), &candidates, &options).is_none());
    }

    #[test]
    fn test_select_fuzzy_best_score_wins() {
        let options = FuzzyOptions::default();
        let candidates = vec![
            candidate("Artist - Song (Live)", 200_000),
            candidate("Artist - Song", 100_000),
        ];
        let selected = select_fuzzy(&source("Song", 200_000), &candidates, &options).unwrap();
        assert_eq!(selected.search_string, "Artist - Song");
    }

    #[test]
    fn test_select_fuzzy_duration_tiebreak() {
        let options = FuzzyOptions::default();
        let candidates = vec![
            candidate("Artist - Song", 200_000),
            candidate("Artist - Song", 208_000),
        ];
        let selected = select_fuzzy(&source("Song", 205_000), &candidates, &options).unwrap();
        assert_eq!(selected.duration_ms, 208_000);
    }

    #[test]
    fn test_select_fuzzy_equal_distance_first_listed_wins() {
        let options = FuzzyOptions::default();
        let track = source("Song", 205_000);

        let candidates = vec![
            candidate("Artist - Song", 200_000),
            candidate("Artist - Song", 210_000),
        ];
        let selected = select_fuzzy(&track, &candidates, &options).unwrap();
        assert_eq!(selected.duration_ms, 200_000);

        let reversed = vec![
            candidate("Artist - Song", 210_000),
            candidate("Artist - Song", 200_000),
        ];
        let selected = select_fuzzy(&track, &reversed, &options).unwrap();
        assert_eq!(selected.duration_ms, 210_000);
    }

    #[test]
    fn test_strategy_dispatch() {
        let candidates = vec![candidate("Artist - Song", 1)];
        let track = source("Song", 1);
        assert!(SelectStrategy::default().select(&track, &candidates).is_some());
        assert!(SelectStrategy::Fuzzy(FuzzyOptions::default())
            .select(&track, &candidates)
            .is_some());
    }
}
