//! Ordered pattern lists for expect calls.

use regex::Regex;

use crate::error::Result;

/// An ordered list of patterns; the first one (by position) that matches wins.
///
/// An empty pattern string occupies its slot but never matches, so callers
/// can disable an alternative without shifting the indices of the others.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Option<Regex>>,
    sources: Vec<String>,
}

impl PatternList {
    /// Compile `patterns` in order.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for pattern in patterns {
            let source = pattern.as_ref();
            let compiled = if source.is_empty() {
                None
            } else {
                Some(Regex::new(source)?)
            };
            list.patterns.push(compiled);
            list.sources.push(source.to_string());
        }
        Ok(list)
    }

    /// A list of already compiled patterns.
    pub fn from_regexes(patterns: impl IntoIterator<Item = Regex>) -> Self {
        let mut list = Self::default();
        for regex in patterns {
            list.sources.push(regex.as_str().to_string());
            list.patterns.push(Some(regex));
        }
        list
    }

    /// Index of the first pattern that matches `text`.
    pub fn first_match(&self, text: &str) -> Option<usize> {
        self.patterns
            .iter()
            .position(|p| p.as_ref().is_some_and(|re| re.is_match(text)))
    }

    /// The compiled pattern at `index`.
    pub fn get(&self, index: usize) -> Option<&Regex> {
        self.patterns.get(index)?.as_ref()
    }

    /// Pattern sources, in order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl From<Regex> for PatternList {
    fn from(regex: Regex) -> Self {
        Self::from_regexes([regex])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_index_wins() {
        let list = PatternList::new(["b", "a", "ab"]).unwrap();
        assert_eq!(list.first_match("xxab"), Some(0));
        assert_eq!(list.first_match("xxa"), Some(1));
        assert_eq!(list.first_match("xyz"), None);
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let list = PatternList::new(["", "foo"]).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.first_match("foo"), Some(1));
        assert_eq!(list.first_match(""), None);
        assert!(list.get(0).is_none());
        assert_eq!(list.sources(), ["", "foo"]);
    }

    #[test]
    fn test_default_prompt() {
        let list = PatternList::new([r"[\#\$]\s*$"]).unwrap();
        assert_eq!(list.first_match("user@host:~$ "), Some(0));
        assert_eq!(list.first_match("root@host:~#"), Some(0));
        assert_eq!(list.first_match("price: $5"), None);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternList::new(["("]).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidPattern(_)));
    }
}
