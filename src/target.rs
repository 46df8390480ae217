//! Target list parsing and identifier extraction

use crate::types::TargetId;
use thiserror::Error;
use url::Url;

/// A URL from which no target identifier can be extracted
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cannot resolve identifier from {url:?}: {reason}")]
pub struct Unresolvable {
    /// The offending input
    pub url: String,
    /// What was wrong with it
    pub reason: String,
}

/// Split raw target list contents into URLs
///
/// Entries are separated by newlines and/or commas; surrounding whitespace is
/// trimmed and blank entries are dropped. Order and duplicates are preserved.
pub fn parse_target_list(contents: &str) -> Vec<String> {
    contents
        .split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

impl TargetId {
    /// Extract the identifier from a canonical profile URL
    ///
    /// The identifier is the first non-empty path segment after the `prefix`
    /// segment (`https://service.example/in/jane-smith/` gives `jane-smith`
    /// for prefix `in`). URLs without a scheme are read as https.
    pub fn from_url(raw: &str, prefix: &str) -> Result<Self, Unresolvable> {
        let unresolvable = |reason: &str| Unresolvable {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(unresolvable("empty URL"));
        }

        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("https://{trimmed}"))
                    .map_err(|e| unresolvable(&e.to_string()))?
            }
            Err(e) => return Err(unresolvable(&e.to_string())),
        };
        if url.cannot_be_a_base() {
            return Err(unresolvable("URL has no path"));
        }

        let prefix = prefix.trim_matches('/');
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let position = segments
            .iter()
            .position(|segment| *segment == prefix)
            .ok_or_else(|| unresolvable(&format!("no /{prefix}/ segment")))?;

        let raw_id = segments[position + 1..]
            .iter()
            .find(|segment| !segment.is_empty())
            .ok_or_else(|| unresolvable(&format!("nothing follows /{prefix}/")))?;

        let decoded = urlencoding::decode(raw_id)
            .map_err(|_| unresolvable("identifier is not valid UTF-8"))?;
        let id = decoded.trim();

        if id.is_empty() || id == "." || id == ".." {
            return Err(unresolvable("identifier is not a usable file name"));
        }
        if id.contains(['/', '\\', '\0']) {
            return Err(unresolvable("identifier contains a path separator"));
        }

        Ok(TargetId(id.to_string()))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Result<String, Unresolvable> {
        TargetId::from_url(url, "in").map(|id| id.to_string())
    }

    #[test]
    fn extracts_segment_after_prefix() {
        assert_eq!(id("https://service.example/in/jane-smith/").unwrap(), "jane-smith");
        assert_eq!(
            id("https://service.example/in/john-doe-123456").unwrap(),
            "john-doe-123456"
        );
        assert_eq!(
            id("https://www.service.example/in/jane-smith/details/experience/").unwrap(),
            "jane-smith"
        );
        assert_eq!(
            id("https://service.example/in/jane-smith?trk=feed#top").unwrap(),
            "jane-smith"
        );
    }

    #[test]
    fn missing_scheme_is_tolerated() {
        assert_eq!(id("service.example/in/jane-smith").unwrap(), "jane-smith");
    }

    #[test]
    fn percent_encoding_is_decoded() {
        assert_eq!(id("https://service.example/in/j%C3%BCrgen-m").unwrap(), "jürgen-m");
    }

    #[test]
    fn malformed_urls_are_unresolvable() {
        for bad in [
            "",
            "   ",
            "https://service.example/company/acme",
            "https://service.example/in/",
            "https://service.example/in//",
            "mailto:someone@service.example",
            "https://service.example/in/..",
            "https://service.example/in/a%2Fb",
            "http://[::1",
        ] {
            let err = id(bad).unwrap_err();
            assert_eq!(err.url, bad);
        }
    }

    #[test]
    fn prefix_is_configurable() {
        let got = TargetId::from_url("https://service.example/pub/jane", "/pub/").unwrap();
        assert_eq!(got.as_str(), "jane");
    }

    #[test]
    fn list_splits_on_newlines_and_commas() {
        let contents = "https://a.example/in/one/, https://a.example/in/two\n\n  https://a.example/in/three  ,\r\n,https://a.example/in/one/\n";
        assert_eq!(
            parse_target_list(contents),
            vec![
                "https://a.example/in/one/",
                "https://a.example/in/two",
                "https://a.example/in/three",
                "https://a.example/in/one/",
            ]
        );
        assert!(parse_target_list(" \n , \n").is_empty());
    }
}
