//! Domain lock and link normalisation.

use url::Url;

use crate::error::{CrawlError, CrawlResult};

/// Link prefixes that never lead to a crawlable page.
const SKIPPED_PREFIXES: [&str; 5] = ["#", "javascript:", "mailto:", "tel:", "data:"];

/// The set of URLs a crawl is allowed to touch.
///
/// A URL is in scope when it uses `http` or `https` and its host is the
/// allowed domain or a sub-domain of it.
#[derive(Debug, Clone)]
pub struct UrlScope {
    domain: String,
}

impl UrlScope {
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into().trim().trim_end_matches('.').to_lowercase();
        Self { domain }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether `url` may be fetched.
    pub fn allows(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_lowercase();
        host == self.domain
            || host
                .strip_suffix(&self.domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Resolve an `href` found on `base` into a crawlable URL.
    ///
    /// Returns `None` for fragment-only and non-page links, unparsable
    /// hrefs and anything out of scope. The fragment is stripped.
    pub fn resolve(&self, base: &Url, href: &str) -> Option<Url> {
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if href.is_empty() || SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return None;
        }

        let mut url = base.join(href).ok()?;
        url.set_fragment(None);
        self.allows(&url).then_some(url)
    }

    /// Validate the seed of a run.
    pub fn check_seed(&self, seed: &str) -> CrawlResult<Url> {
        let mut url = Url::parse(seed.trim()).map_err(|_| CrawlError::InvalidUrl {
            url: seed.to_string(),
        })?;
        url.set_fragment(None);

        if !self.allows(&url) {
            return Err(CrawlError::OutOfScope {
                url: url.to_string(),
                domain: self.domain.clone(),
            });
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> UrlScope {
        UrlScope::new("swim.example")
    }

    fn base() -> Url {
        Url::parse("https://swim.example/plans/index.html").unwrap()
    }

    #[test]
    fn test_allows_domain_and_subdomains() {
        let scope = scope();
        assert!(scope.allows(&Url::parse("https://swim.example/a").unwrap()));
        assert!(scope.allows(&Url::parse("http://www.swim.example/a").unwrap()));
        assert!(!scope.allows(&Url::parse("https://notswim.example/a").unwrap()));
        assert!(!scope.allows(&Url::parse("https://swim.example.org/a").unwrap()));
        assert!(!scope.allows(&Url::parse("ftp://swim.example/a").unwrap()));
    }

    #[test]
    fn test_resolve_relative_and_strip_fragment() {
        let url = scope().resolve(&base(), "plan-7.html#rows").unwrap();
        assert_eq!(url.as_str(), "https://swim.example/plans/plan-7.html");

        let url = scope().resolve(&base(), "/about").unwrap();
        assert_eq!(url.as_str(), "https://swim.example/about");
    }

    #[test]
    fn test_resolve_skips_non_page_links() {
        let scope = scope();
        for href in [
            "#top",
            "mailto:coach@swim.example",
            "tel:+4912345",
            "JavaScript:void(0)",
            "https://elsewhere.example/plan",
            "",
        ] {
            assert!(scope.resolve(&base(), href).is_none(), "{href} should be skipped");
        }
    }

    #[test]
    fn test_check_seed() {
        let scope = scope();
        assert!(scope.check_seed("https://swim.example/start").is_ok());
        assert!(matches!(
            scope.check_seed("not a url"),
            Err(CrawlError::InvalidUrl { .. })
        ));
        assert!(matches!(
            scope.check_seed("https://elsewhere.example/"),
            Err(CrawlError::OutOfScope { .. })
        ));
    }
}
