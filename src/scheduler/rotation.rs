//! Topic rotation
//!
//! Selects the next topic for a generation run: round-robin over the
//! configured catalog, falling back to a built-in catalog when the
//! configuration is empty so the scheduler never stalls. Selection
//! avoids repeating the immediately preceding category when more than
//! one topic is available; this is anti-repetition, not strict
//! uniqueness, so a two-topic catalog alternates.

use crate::models::Topic;

/// Round-robin topic selector with a built-in fallback catalog
#[derive(Debug, Clone)]
pub struct TopicRotator {
    fallback: Vec<Topic>,
}

impl TopicRotator {
    /// Create a rotator with the default fallback catalog
    pub fn new() -> Self {
        Self {
            fallback: default_catalog(),
        }
    }

    /// Select the next topic given the configured catalog and the
    /// category used by the immediately preceding run
    pub fn next_topic(&self, configured: &[Topic], last_category: Option<&str>) -> Topic {
        let catalog: &[Topic] = if configured.is_empty() {
            &self.fallback
        } else {
            configured
        };

        if catalog.len() == 1 {
            return catalog[0].clone();
        }

        let start = match last_category.and_then(|last| {
            catalog.iter().position(|topic| topic.category == last)
        }) {
            Some(pos) => (pos + 1) % catalog.len(),
            None => return catalog[0].clone(),
        };

        // Skip over catalog entries that repeat the previous category;
        // bounded by one full cycle for catalogs with duplicates
        for offset in 0..catalog.len() {
            let candidate = &catalog[(start + offset) % catalog.len()];
            if last_category != Some(candidate.category.as_str()) {
                return candidate.clone();
            }
        }

        catalog[start].clone()
    }

    /// The built-in catalog used when no topics are configured
    pub fn fallback_catalog(&self) -> &[Topic] {
        &self.fallback
    }
}

impl Default for TopicRotator {
    fn default() -> Self {
        Self::new()
    }
}

fn default_catalog() -> Vec<Topic> {
    vec![
        Topic::new(
            "Custom Home Building",
            vec!["custom homes", "home builder", "building process"],
        ),
        Topic::new(
            "Neighborhoods",
            vec!["Tetherow", "NorthWest Crossing", "Brasada Ranch"],
        ),
        Topic::new(
            "Home Design",
            vec!["modern mountain", "floor plans", "energy efficient"],
        ),
        Topic::new(
            "Buying Land",
            vec!["lots", "acreage", "site evaluation"],
        ),
        Topic::new(
            "Market Trends",
            vec!["home prices", "real estate market", "central oregon"],
        ),
        Topic::new(
            "Living in Bend",
            vec!["outdoor recreation", "relocation", "lifestyle"],
        ),
    ]
}
