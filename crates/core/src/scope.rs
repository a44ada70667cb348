use url::Url;

use crate::canon::canonicalize;
use crate::entities::{Page, Site};

/// Decide whether `url` belongs to `site`'s scope.
///
/// 1. If `parent_page` is given and `site.scope.max_hops` is set, reject
///    once the parent is already at or past the hop limit.
/// 2. Reject non-http(s) schemes.
/// 3. Canonicalize `url` and accept iff the result starts with
///    `site.scope.surt`.
///
/// Parse errors are not fatal: they're logged at `warn` and yield `false`.
pub fn is_in_scope(site: &Site, url: &str, parent_page: Option<&Page>) -> bool {
    if let Some(parent) = parent_page {
        if let Some(max_hops) = site.scope.max_hops {
            if parent.hops_from_seed >= max_hops {
                return false;
            }
        }
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(url, "problem parsing url");
            return false;
        }
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let surtt = canonicalize(url);
    surtt.starts_with(&site.scope.surt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_with_surt(surt: &str, max_hops: Option<u32>) -> Site {
        let mut site = Site::new("http://example.com/", "job1");
        site.scope.surt = surt.to_string();
        site.scope.max_hops = max_hops;
        site
    }

    #[test]
    fn accepts_url_under_scope_prefix() {
        let site = site_with_surt("http://(com,example,)/", None);
        assert!(is_in_scope(&site, "http://example.com/a", None));
    }

    #[test]
    fn rejects_url_outside_scope_prefix() {
        let site = site_with_surt("http://(com,example,)/", None);
        assert!(!is_in_scope(&site, "http://other.org/a", None));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let site = site_with_surt("http://(com,example,)/", None);
        assert!(!is_in_scope(&site, "ftp://example.com/a", None));
    }

    #[test]
    fn rejects_unparseable_url() {
        let site = site_with_surt("http://(com,example,)/", None);
        assert!(!is_in_scope(&site, "not a url", None));
    }

    #[test]
    fn max_hops_zero_rejects_any_outlink() {
        let site = site_with_surt("http://(com,example,)/", Some(0));
        let parent = Page::new("http://example.com/", "s1", "j1", 0, None, Some(1000));
        assert!(!is_in_scope(&site, "http://example.com/a", Some(&parent)));
    }

    #[test]
    fn max_hops_allows_until_limit() {
        let site = site_with_surt("http://(com,example,)/", Some(2));
        let parent = Page::new("http://example.com/a", "s1", "j1", 1, None, None);
        assert!(is_in_scope(&site, "http://example.com/a/b", Some(&parent)));
    }
}
