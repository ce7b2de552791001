//! Query parsing

use super::SearchError;

/// Shortest accepted query after trimming, in characters
pub const MIN_QUERY_LENGTH: usize = 2;

/// Longest accepted query, in characters
pub const MAX_QUERY_LENGTH: usize = 200;

/// A normalized search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Lowercase with whitespace collapsed to single spaces
    pub phrase: String,

    /// Distinct words of the phrase in order of appearance, each at least
    /// [`MIN_QUERY_LENGTH`] characters long
    pub terms: Vec<String>,
}

impl ParsedQuery {
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let phrase = normalize(raw);
        let len = phrase.chars().count();

        if len < MIN_QUERY_LENGTH {
            return Err(SearchError::QueryTooShort(MIN_QUERY_LENGTH));
        }
        if len > MAX_QUERY_LENGTH {
            return Err(SearchError::QueryTooLong(MAX_QUERY_LENGTH));
        }

        let mut terms: Vec<String> = Vec::new();
        for word in phrase.split(' ') {
            if word.chars().count() < MIN_QUERY_LENGTH {
                continue;
            }
            if !terms.iter().any(|t| t == word) {
                terms.push(word.to_string());
            }
        }

        Ok(Self { phrase, terms })
    }
}

pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Launch   PLAN\t2025 "), "launch plan 2025");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_parse_terms_deduplicated() {
        let q = ParsedQuery::parse("Design review design").unwrap();
        assert_eq!(q.phrase, "design review design");
        assert_eq!(q.terms, vec!["design", "review"]);
    }

    #[test]
    fn test_parse_drops_short_terms() {
        let q = ParsedQuery::parse("a plan").unwrap();
        assert_eq!(q.phrase, "a plan");
        assert_eq!(q.terms, vec!["plan"]);

        // Phrase is long enough even though no single word is
        let q = ParsedQuery::parse("a b").unwrap();
        assert_eq!(q.phrase, "a b");
        assert!(q.terms.is_empty());
    }

    #[test]
    fn test_parse_rejects_short_queries() {
        assert!(matches!(
            ParsedQuery::parse("  a  "),
            Err(SearchError::QueryTooShort(2))
        ));
        assert!(ParsedQuery::parse("").is_err());
        assert!(ParsedQuery::parse("ab").is_ok());
    }

    #[test]
    fn test_parse_rejects_long_queries() {
        let long = "x".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            ParsedQuery::parse(&long),
            Err(SearchError::QueryTooLong(_))
        ));
    }
}
