use url::Url;

/// Produce a sort-friendly canonical form of a URL ("SURT": Sort-friendly
/// URI Reordering Transform) used for scope prefix matching and page
/// identity, e.g. `http://example.com/a` -> `http://(com,example,)/a`.
///
/// Query and fragment are stripped before canonicalization (dropped simply
/// by reading only the parsed URL's path). Pure, deterministic, total: on
/// parse failure or a host-less URL this returns the empty string, and
/// callers must treat that as out of scope.
pub fn canonicalize(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    let mut labels: Vec<&str> = host.split('.').collect();
    labels.reverse();
    let reversed_host = labels.join(",");
    format!(
        "{}://({},){}",
        parsed.scheme(),
        reversed_host,
        parsed.path()
    )
}

/// The URL's bare path component (no scheme, host, query or fragment), used
/// by the priority function's slash count. Empty string if the URL doesn't
/// parse.
pub fn path_of(url: &str) -> String {
    Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_simple_url() {
        assert_eq!(
            canonicalize("http://example.com/a"),
            "http://(com,example,)/a"
        );
    }

    #[test]
    fn canonicalizes_root() {
        assert_eq!(
            canonicalize("http://example.com/"),
            "http://(com,example,)/"
        );
    }

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(
            canonicalize("http://example.com/a?x=1#frag"),
            "http://(com,example,)/a"
        );
    }

    #[test]
    fn reverses_subdomains() {
        assert_eq!(
            canonicalize("http://a.example.com/"),
            "http://(com,example,a,)/"
        );
    }

    #[test]
    fn parse_failure_yields_empty_string() {
        assert_eq!(canonicalize("not a url"), "");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn non_host_scheme_yields_empty_string() {
        assert_eq!(canonicalize("data:text/plain,hello"), "");
    }
}
