use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32String};
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

/// Fuzzy scores never reach an exact match.
const FUZZY_CEILING: f32 = 0.9;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "of", "on", "or", "the",
    "to", "with", "within", "и", "в", "во", "на", "по", "для", "с", "со", "к", "о", "об", "от",
    "из", "или", "при",
];

#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase word tokens.
#[must_use]
pub fn tokens(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Lowercase word tokens without stopwords and bare numbers.
#[must_use]
pub fn content_tokens(text: &str) -> Vec<String> {
    tokens(text)
        .into_iter()
        .filter(|t| !is_stopword(t) && !t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Sørensen-Dice coefficient over distinct word tokens.
#[must_use]
pub fn token_dice(a: &str, b: &str) -> f32 {
    let left: BTreeSet<String> = tokens(a).into_iter().collect();
    let right: BTreeSet<String> = tokens(b).into_iter().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    #[allow(clippy::cast_precision_loss)]
    let dice = (2 * shared) as f32 / (left.len() + right.len()) as f32;
    dice
}

/// True when `needle` occurs in `haystack` on word boundaries (both normalized).
#[must_use]
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// True when `term` starts at a word boundary of `haystack`, so stems such as
/// `statistic` or `нежелательн` also hit inflected forms.
#[must_use]
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    format!(" {haystack}").contains(&format!(" {term}"))
}

/// Heading-to-alias similarity on top of nucleo-matcher.
pub struct HeadingMatcher {
    matcher: Matcher,
}

impl HeadingMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
        }
    }

    /// 1.0 on exact equality of normalized texts; otherwise the nucleo score of the
    /// alias against the heading, normalized by the alias self-score and capped at 0.9.
    pub fn similarity(&mut self, heading: &str, alias: &str) -> f32 {
        if heading.is_empty() || alias.is_empty() {
            return 0.0;
        }
        if heading == alias {
            return 1.0;
        }

        let pattern = Pattern::parse(alias, CaseMatching::Ignore, Normalization::Smart);
        let alias_haystack = Utf32String::from(alias);
        let Some(self_score) = pattern.score(alias_haystack.slice(..), &mut self.matcher) else {
            return 0.0;
        };
        if self_score == 0 {
            return 0.0;
        }
        let heading_haystack = Utf32String::from(heading);
        let score = pattern
            .score(heading_haystack.slice(..), &mut self.matcher)
            .unwrap_or(0);

        #[allow(clippy::cast_precision_loss)]
        let ratio = (score as f32 / self_score as f32).min(1.0);
        ratio * FUZZY_CEILING
    }
}

impl Default for HeadingMatcher {
    fn default() -> Self {
        Self::new()
    }
}
