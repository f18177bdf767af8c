//! Keyword matching strategy shared by the differential matcher and the
//! product-family lookup.
//!
//! Short keywords (abbreviations such as "RA", "VT", "AZ") only match on word
//! boundaries so they cannot collide with substrings of longer words
//! ("rapid", "svt", "hazard"). Longer keywords match as case-insensitive
//! substrings.

use regex::Regex;

use crate::Result;

/// Keywords with at most this many characters use word-boundary matching.
pub const SHORT_KEYWORD_MAX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    WordBoundary,
    Substring,
}

impl MatchStrategy {
    pub fn for_keyword(keyword: &str) -> Self {
        if keyword.chars().count() <= SHORT_KEYWORD_MAX_LEN {
            MatchStrategy::WordBoundary
        } else {
            MatchStrategy::Substring
        }
    }
}

/// A keyword compiled for its strategy. Match input must already be lower-cased.
#[derive(Debug, Clone)]
pub struct KeywordPattern {
    keyword: String,
    lowered: String,
    strategy: MatchStrategy,
    boundary: Option<Regex>,
}

impl KeywordPattern {
    pub fn new(keyword: &str) -> Result<Self> {
        let lowered = keyword.trim().to_lowercase();
        let strategy = MatchStrategy::for_keyword(&lowered);
        let boundary = match strategy {
            MatchStrategy::WordBoundary => {
                Some(Regex::new(&format!(r"\b{}\b", regex::escape(&lowered)))?)
            }
            MatchStrategy::Substring => None,
        };
        Ok(Self {
            keyword: keyword.to_string(),
            lowered,
            strategy,
            boundary,
        })
    }

    pub fn compile_all(keywords: &[String]) -> Result<Vec<Self>> {
        keywords.iter().map(|k| Self::new(k)).collect()
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn is_match(&self, lowered_text: &str) -> bool {
        if self.lowered.is_empty() {
            return false;
        }
        match &self.boundary {
            Some(re) => re.is_match(lowered_text),
            None => lowered_text.contains(&self.lowered),
        }
    }
}

/// First pattern (in list order) that matches the text.
pub fn first_match<'a>(patterns: &'a [KeywordPattern], lowered_text: &str) -> Option<&'a KeywordPattern> {
    patterns.iter().find(|p| p.is_match(lowered_text))
}

pub fn any_match(patterns: &[KeywordPattern], lowered_text: &str) -> bool {
    first_match(patterns, lowered_text).is_some()
}
