//! Classification of links inside rendered content.
//!
//! Relative links in a previewed document point at other files in the
//! repository; clicking them should navigate the preview (a `getEntry`
//! request) instead of loading a new page. Links to other origins open
//! externally, and fragment-only links scroll within the page.

use url::Url;

/// What a clicked link should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Another origin (or an opaque URL such as `mailto:`)
    External(Url),
    /// A fragment of the current document
    Anchor(String),
    /// Another path under the root
    Navigate {
        /// `/`-separated, relative to the root, percent-decoded
        path: String,
        fragment: Option<String>,
    },
}

/// Classify `href` as found in the document at `current_path` (relative
/// to the root), served from `base`.
///
/// Returns `None` when `href` cannot be parsed.
pub fn classify(base: &Url, current_path: &str, href: &str) -> Option<Link> {
    let document = base.join(current_path.trim_start_matches('/')).ok()?;
    let target = document.join(href).ok()?;

    if target.origin() != base.origin() {
        return Some(Link::External(target));
    }

    let fragment = target.fragment().map(ToOwned::to_owned);
    if let Some(fragment) = &fragment
        && target.path() == document.path()
        && target.query() == document.query()
    {
        return Some(Link::Anchor(fragment.clone()));
    }

    let relative = target
        .path()
        .strip_prefix(base.path())
        .unwrap_or_else(|| target.path().trim_start_matches('/'));
    Some(Link::Navigate {
        path: percent_decode(relative),
        fragment,
    })
}

fn percent_decode(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:6041/").unwrap()
    }

    #[test]
    fn test_other_origin_is_external() {
        let link = classify(&base(), "README.md", "https://example.com/page").unwrap();
        assert!(matches!(link, Link::External(url) if url.host_str() == Some("example.com")));
    }

    #[test]
    fn test_mailto_is_external() {
        let link = classify(&base(), "README.md", "mailto:someone@example.com").unwrap();
        assert!(matches!(link, Link::External(_)));
    }

    #[test]
    fn test_fragment_only_is_anchor() {
        let link = classify(&base(), "docs/guide.md", "#install").unwrap();
        assert_eq!(link, Link::Anchor("install".to_string()));
    }

    #[test]
    fn test_hash_earlier_in_path_is_not_an_anchor() {
        // The document itself lives under a directory containing '#'
        let link = classify(&base(), "c%23/notes.md", "other.md").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "c#/other.md".to_string(),
                fragment: None,
            }
        );
    }

    #[test]
    fn test_relative_link_navigates() {
        let link = classify(&base(), "docs/guide.md", "../src/lib.rs").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "src/lib.rs".to_string(),
                fragment: None,
            }
        );
    }

    #[test]
    fn test_link_to_other_document_section_navigates() {
        let link = classify(&base(), "README.md", "docs/api.md#errors").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "docs/api.md".to_string(),
                fragment: Some("errors".to_string()),
            }
        );
    }

    #[test]
    fn test_absolute_same_origin_url_navigates() {
        let link = classify(&base(), "README.md", "http://localhost:6041/my%20notes.md").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "my notes.md".to_string(),
                fragment: None,
            }
        );
    }

    #[test]
    fn test_malformed_escapes_are_kept_literally() {
        let link = classify(&base(), "README.md", "100%zz.md").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "100%zz.md".to_string(),
                fragment: None,
            }
        );
    }

    #[test]
    fn test_invalid_utf8_escape_is_replaced() {
        let link = classify(&base(), "README.md", "caf%FF.md").unwrap();
        assert_eq!(
            link,
            Link::Navigate {
                path: "caf\u{FFFD}.md".to_string(),
                fragment: None,
            }
        );
    }
}
