use std::sync::Arc;

use frontier_core::{
    scope::is_in_scope, AllowAll, FrontierConfig, Job, OutlinkCounts, Page, Result, RobotsChecker,
    Site, SiteStatus,
};
use frontier_store::Store;
use tracing::{info, warn};

/// The coordination core: claim/disclaim, outlink scheduling, and
/// job/site finishing logic, built on top of [`Store`] plus the core
/// crate's scope/priority/canonicalization rules.
pub struct Frontier {
    store: Store,
    robots: Arc<dyn RobotsChecker>,
    config: FrontierConfig,
}

impl Frontier {
    pub fn new(store: Store, config: FrontierConfig) -> Self {
        Frontier {
            store,
            robots: Arc::new(AllowAll),
            config,
        }
    }

    pub fn with_robots_checker(mut self, robots: Arc<dyn RobotsChecker>) -> Self {
        self.robots = robots;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn is_permitted_by_robots(&self, site: &Site, url: &str) -> Result<bool> {
        self.robots.is_permitted(site, url).await
    }

    pub async fn new_job(&self, job: &mut Job) -> Result<()> {
        info!(job_id = %job.id, "inserting job");
        self.store.new_job(job).await
    }

    pub async fn new_site(&self, site: &mut Site) -> Result<()> {
        info!(site_id = %site.id, seed = %site.seed, "inserting site");
        self.store.new_site(site).await
    }

    pub async fn new_page(&self, page: &Page) -> Result<()> {
        self.store.new_page(page).await
    }

    pub async fn update_job(&self, job: &Job) -> Result<()> {
        self.store.update_job(job).await
    }

    pub async fn update_site(&self, site: &Site) -> Result<()> {
        self.store.update_site(site).await
    }

    pub async fn update_page(&self, page: &Page) -> Result<()> {
        self.store.update_page(page).await
    }

    /// Claims the longest-idle active site, enforcing each candidate's time
    /// limit opportunistically before returning it — a site that has
    /// overrun its budget is finished on the spot and the loop tries again.
    pub async fn claim_site(&self, worker_id: &str) -> Result<Site> {
        loop {
            let Some(site) = self
                .store
                .claim_site(
                    worker_id,
                    self.config.claimable_last_disclaimed_max,
                    self.config.claim_lease_secs,
                )
                .await?
            else {
                return Err(frontier_core::FrontierError::NothingToClaim);
            };

            if self.enforce_time_limit(&site).await? {
                continue;
            }
            return Ok(site);
        }
    }

    async fn enforce_time_limit(&self, site: &Site) -> Result<bool> {
        if let Some(time_limit) = site.time_limit {
            if time_limit > 0.0 && frontier_core::now_epoch_secs() - site.start_time > time_limit {
                let mut site = site.clone();
                self.finished(&mut site, SiteStatus::FinishedTimeLimit)
                    .await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn claim_page(&self, site: &Site, worker_id: &str) -> Result<Page> {
        self.store
            .claim_page(&site.id, worker_id, self.config.claim_lease_secs)
            .await?
            .ok_or(frontier_core::FrontierError::NothingToClaim)
    }

    pub async fn has_outstanding_pages(&self, site: &Site) -> Result<bool> {
        self.store.has_outstanding_pages(&site.id).await
    }

    /// Records one processing of `page`, widening `site`'s scope if the
    /// seed hop redirected off its original domain.
    pub async fn completed_page(&self, site: &mut Site, page: &mut Page) -> Result<()> {
        page.brozzle_count += 1;
        page.claimed = false;
        self.update_page(page).await?;
        if page.hops_from_seed == 0 {
            if let Some(redirect_url) = page.redirect_url.clone() {
                site.note_seed_redirect(&redirect_url);
                self.update_site(site).await?;
            }
        }
        Ok(())
    }

    /// Releases `site`'s claim. If no page was handed back and nothing
    /// remains outstanding, the site is finished. Any handed-back page is
    /// returned to the pool unclaimed.
    pub async fn disclaim_site(&self, site: &mut Site, page: Option<&mut Page>) -> Result<()> {
        info!(site_id = %site.id, "disclaiming site");
        site.claimed = false;
        site.last_disclaimed = frontier_core::now_epoch_secs();

        if page.is_none() && !self.has_outstanding_pages(site).await? {
            self.finished(site, SiteStatus::Finished).await?;
        } else {
            self.update_site(site).await?;
        }

        if let Some(page) = page {
            page.claimed = false;
            self.update_page(page).await?;
        }
        Ok(())
    }

    /// Evaluates scope and robots permission for each outlink, then either
    /// inserts a new child page or boosts an existing one's priority.
    pub async fn scope_and_schedule_outlinks(
        &self,
        site: &Site,
        parent_page: &Page,
        urls: &[String],
    ) -> Result<OutlinkCounts> {
        let mut counts = OutlinkCounts::default();
        for url in urls {
            if !is_in_scope(site, url, Some(parent_page)) {
                counts.rejected += 1;
                continue;
            }
            if !self.robots.is_permitted(site, url).await? {
                counts.blocked += 1;
                continue;
            }
            let child = Page::new(
                url.clone(),
                site.id.clone(),
                site.job_id.clone(),
                parent_page.hops_from_seed + 1,
                Some(parent_page.id.clone()),
                None,
            );
            match self.store.get_page(&child.id).await? {
                Some(_existing) => {
                    self.store
                        .bump_page_priority(&child.id, child.priority)
                        .await?;
                    counts.updated += 1;
                }
                None => {
                    self.store.new_page(&child).await?;
                    counts.added += 1;
                }
            }
        }
        info!(
            added = counts.added,
            updated = counts.updated,
            rejected = counts.rejected,
            blocked = counts.blocked,
            parent_page_id = %parent_page.id,
            "scheduled outlinks"
        );
        Ok(counts)
    }

    /// Sets `site`'s status to a terminal value and checks whether that
    /// completes its job.
    async fn finished(&self, site: &mut Site, status: SiteStatus) -> Result<()> {
        info!(site_id = %site.id, status = status.as_str(), "site finished");
        site.status = status;
        self.update_site(site).await?;
        self.maybe_finish_job(&site.job_id).await?;
        Ok(())
    }

    /// Returns `true` if the job is (already, or now) finished.
    async fn maybe_finish_job(&self, job_id: &str) -> Result<bool> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(true);
        }
        if !self.store.all_sites_terminal(job_id).await? {
            return Ok(false);
        }
        info!(job_id, "all sites finished, job is FINISHED");
        job.status = frontier_core::JobStatus::Finished;
        job.finished = Some(chrono::Utc::now());
        self.update_job(&job).await?;
        Ok(true)
    }

    /// Records a reached-limit marker and finishes the site, unless a
    /// different marker was already recorded (first-writer wins).
    pub async fn reached_limit(&self, site: &mut Site, marker: String) -> Result<()> {
        info!(site_id = %site.id, marker, "reached_limit");
        match &site.reached_limit {
            Some(existing) if existing != &marker => {
                warn!(
                    site_id = %site.id,
                    existing,
                    new = marker,
                    "reached limit but site had already reached a different limit"
                );
            }
            _ => {
                site.reached_limit = Some(marker);
                self.finished(site, SiteStatus::FinishedReachedLimit)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    async fn test_frontier() -> Option<Frontier> {
        let url = pg_url()?;
        let store = frontier_store::testing::fresh_test_store(&url).await;
        Some(Frontier::new(store, FrontierConfig::default()))
    }

    #[tokio::test]
    async fn single_seed_end_to_end() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let mut job = Job::new("", serde_json::json!({}));
        frontier.new_job(&mut job).await.unwrap();

        let mut site = Site::new("http://example.com/", job.id.clone());
        frontier.new_site(&mut site).await.unwrap();
        assert_eq!(site.scope.surt, "http://(com,example,)/");

        let seed_page = Page::new(
            site.seed.clone(),
            site.id.clone(),
            site.job_id.clone(),
            0,
            None,
            Some(frontier_core::priority::SEED_PRIORITY),
        );
        frontier.new_page(&seed_page).await.unwrap();

        let claimed = frontier.claim_site("w1").await.unwrap();
        assert!(claimed.claimed);
        assert_eq!(claimed.last_claimed_by.as_deref(), Some("w1"));

        let err = frontier.claim_site("w2").await.unwrap_err();
        assert!(matches!(err, frontier_core::FrontierError::NothingToClaim));
    }

    #[tokio::test]
    async fn outlink_priority_accumulates_on_rediscovery() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let mut job = Job::new("", serde_json::json!({}));
        frontier.new_job(&mut job).await.unwrap();
        let mut site = Site::new("http://example.com/", job.id.clone());
        frontier.new_site(&mut site).await.unwrap();

        let seed_page = Page::new(
            site.seed.clone(),
            site.id.clone(),
            site.job_id.clone(),
            0,
            None,
            Some(frontier_core::priority::SEED_PRIORITY),
        );
        frontier.new_page(&seed_page).await.unwrap();

        let urls = vec!["http://example.com/a/b".to_string()];
        let counts = frontier
            .scope_and_schedule_outlinks(&site, &seed_page, &urls)
            .await
            .unwrap();
        assert_eq!(counts.added, 1);

        let counts2 = frontier
            .scope_and_schedule_outlinks(&site, &seed_page, &urls)
            .await
            .unwrap();
        assert_eq!(counts2.updated, 1);

        let child_id = Page::new(
            "http://example.com/a/b",
            site.id.clone(),
            site.job_id.clone(),
            1,
            Some(seed_page.id.clone()),
            None,
        )
        .id;
        let child = frontier.store().get_page(&child_id).await.unwrap().unwrap();
        assert_eq!(child.priority, 13 * 2);
    }

    #[tokio::test]
    async fn time_limit_finishes_site_on_claim() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let mut job = Job::new("", serde_json::json!({}));
        frontier.new_job(&mut job).await.unwrap();
        let mut site = Site::new("http://example.com/", job.id.clone());
        site.time_limit = Some(1.0);
        site.start_time = frontier_core::now_epoch_secs() - 2.0;
        frontier.new_site(&mut site).await.unwrap();

        let err = frontier.claim_site("w1").await.unwrap_err();
        assert!(matches!(err, frontier_core::FrontierError::NothingToClaim));

        let reloaded = frontier.store().get_site(&site.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SiteStatus::FinishedTimeLimit);
    }

    #[tokio::test]
    async fn job_finishes_when_all_sites_terminal() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let mut job = Job::new("", serde_json::json!({}));
        frontier.new_job(&mut job).await.unwrap();

        let mut site_a = Site::new("http://a.example.com/", job.id.clone());
        frontier.new_site(&mut site_a).await.unwrap();
        let mut site_b = Site::new("http://b.example.com/", job.id.clone());
        frontier.new_site(&mut site_b).await.unwrap();

        frontier.disclaim_site(&mut site_a, None).await.unwrap();
        let reloaded_job = frontier.store().get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(reloaded_job.status, frontier_core::JobStatus::Active);

        frontier.disclaim_site(&mut site_b, None).await.unwrap();
        let reloaded_job = frontier.store().get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(reloaded_job.status, frontier_core::JobStatus::Finished);
        assert!(reloaded_job.finished.is_some());
    }
}
