use async_trait::async_trait;

use crate::entities::Site;
use crate::error::FrontierError;

/// The frontier's narrow interface onto robots-exclusion checking. Real
/// robots.txt fetching and parsing is an external collaborator and out of
/// scope for this crate; this trait is the seam a caller plugs one into.
///
/// `Err(FrontierError::ReachedLimit { .. })` models the external fetch path
/// raising a limit (e.g. a proxy-enforced crawl budget) while checking
/// robots permission; the frontier converts that into a terminal site state
/// via `reached_limit`.
#[async_trait]
pub trait RobotsChecker: Send + Sync {
    async fn is_permitted(&self, site: &Site, url: &str) -> Result<bool, FrontierError>;
}

/// A permissive test double: everything is permitted. The crate's default
/// when no real robots checker is wired in.
pub struct AllowAll;

#[async_trait]
impl RobotsChecker for AllowAll {
    async fn is_permitted(&self, _site: &Site, _url: &str) -> Result<bool, FrontierError> {
        Ok(true)
    }
}
