/// `priority(page) = max(0, 10 - hops_from_seed) + max(0, 6 - slash_count(path))`.
///
/// Higher is better. `path` is the URL's path component (no scheme, host,
/// query or fragment) — counting slashes over the full canonical SURT
/// string would double-count the `scheme://` separator, so the slash count
/// is taken over the bare path instead. Used only on insertion — an
/// existing page's priority grows by addition when it's rediscovered (see
/// the frontier's outlink scheduling), not by recomputing this function.
pub fn priority(hops_from_seed: u32, path: &str) -> i64 {
    let hops_term = 10i64.saturating_sub(hops_from_seed as i64).max(0);
    let slash_count = path.matches('/').count() as i64;
    let slash_term = (6 - slash_count).max(0);
    hops_term + slash_term
}

/// Priority assigned to seed pages so they dominate the claim queue.
pub const SEED_PRIORITY: i64 = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_worked_example() {
        // discovering http://example.com/a/b at hops=1: max(0,10-1) + max(0,6-2) = 9+4 = 13
        assert_eq!(priority(1, "/a/b"), 13);
    }

    #[test]
    fn seed_page_root_path() {
        assert_eq!(priority(0, "/"), 10 + 5);
    }

    #[test]
    fn floors_at_zero() {
        assert_eq!(priority(50, "/a/b/c/d/e/f/g/h"), 0);
    }
}
