//! URL slug derivation and deduplication
//!
//! Slugs are the unique, URL-safe identifiers derived from article
//! titles. Derivation is pure and deterministic so the same title
//! always yields the same base slug; uniqueness against existing
//! slugs is resolved by numeric suffixing.

use lazy_static::lazy_static;
use regex::Regex;

/// Maximum slug length in characters
const MAX_SLUG_LEN: usize = 100;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid");
}

/// Derive a URL slug from a title
///
/// Lowercases, collapses every run of non `[a-z0-9]` characters into a
/// single hyphen, trims leading/trailing hyphens, and truncates to 100
/// characters.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let hyphenated = NON_ALNUM.replace_all(&lowered, "-");
    let trimmed = hyphenated.trim_matches('-');

    let mut slug: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Resolve a slug that does not collide with existing ones
///
/// Returns `base` unchanged when unused, otherwise appends `-2`, `-3`,
/// ... until an unused slug is found. The repository still enforces
/// uniqueness at the storage layer; this only keeps the common path
/// collision-free.
pub fn unique_slug<F>(base: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !exists(base) {
        return base.to_string();
    }

    let mut n: u32 = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(
            slugify("Custom Homes in Bend, Oregon!"),
            "custom-homes-in-bend-oregon"
        );
    }

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("A --- B!!! C"), "a-b-c");
    }

    #[test]
    fn test_slugify_trims_edges() {
        assert_eq!(slugify("  Hello World  "), "hello-world");
        assert_eq!(slugify("!!!Leading and trailing???"), "leading-and-trailing");
    }

    #[test]
    fn test_slugify_truncates() {
        let title = "x".repeat(300);
        assert_eq!(slugify(&title).len(), 100);
    }

    #[test]
    fn test_slugify_truncation_drops_trailing_hyphen() {
        // 99 chars followed by a separator lands the cut on a hyphen
        let title = format!("{} tail", "y".repeat(99));
        let slug = slugify(&title);
        assert!(!slug.ends_with('-'));
        assert!(slug.len() <= 100);
    }

    #[test]
    fn test_slugify_all_punctuation_is_empty() {
        assert_eq!(slugify("!?!?"), "");
    }

    #[test]
    fn test_unique_slug_no_collision() {
        let existing: HashSet<&str> = HashSet::new();
        let slug = unique_slug("custom-homes", |s| existing.contains(s));
        assert_eq!(slug, "custom-homes");
    }

    #[test]
    fn test_unique_slug_suffixes() {
        let existing: HashSet<&str> = ["custom-homes", "custom-homes-2"].into_iter().collect();
        let slug = unique_slug("custom-homes", |s| existing.contains(s));
        assert_eq!(slug, "custom-homes-3");
    }

    #[test]
    fn test_unique_slug_differs_from_taken_base() {
        let slug = unique_slug("taken", |s| s == "taken");
        assert_ne!(slug, "taken");
    }

    proptest! {
        #[test]
        fn prop_slugify_charset_and_length(title in ".{0,300}") {
            let slug = slugify(&title);
            prop_assert!(slug.len() <= 100);
            prop_assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
        }

        #[test]
        fn prop_slugify_deterministic(title in ".{0,300}") {
            prop_assert_eq!(slugify(&title), slugify(&title));
        }
    }
}
