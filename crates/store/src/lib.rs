use chrono::{DateTime, Utc};
use frontier_core::{FrontierError, Job, JobStatus, Page, Result, Scope, Site, SiteStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info};

/// Thin Postgres adapter over `jobs`, `sites`, `pages`.
///
/// Every write is vetted: the caller (the frontier) expects a specific set
/// of affected-row counts, and a mismatch is raised as
/// [`FrontierError::UnexpectedDbResult`] rather than silently ignored.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

fn store_err(e: sqlx::Error) -> FrontierError {
    FrontierError::Store(e.to_string())
}

fn vet(op: &str, table: &str, id: &str, affected: u64, expected: &[u64]) -> Result<()> {
    if !expected.contains(&affected) {
        error!(op, table, id, affected, expected = ?expected, "vetting failed");
        return Err(FrontierError::UnexpectedDbResult {
            detail: format!(
                "{op} on {table} id={id}: expected rows_affected in {expected:?}, got {affected}"
            ),
        });
    }
    Ok(())
}

impl Store {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(store_err)?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        info!("migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- jobs ----

    pub async fn new_job(&self, job: &mut Job) -> Result<()> {
        if job.id.is_empty() {
            job.id = frontier_core::content_id(&[("started", &job.started.to_rfc3339())]);
        }
        let result = sqlx::query(
            "INSERT INTO jobs (id, conf, status, started, finished) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&job.id)
        .bind(&job.conf)
        .bind(job.status.as_str())
        .bind(job.started)
        .bind(job.finished)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("insert", "jobs", &job.id, result.rows_affected(), &[1])?;
        debug!(table = "jobs", id = %job.id, "inserted");
        Ok(())
    }

    pub async fn update_job(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET conf = $2, status = $3, started = $4, finished = $5 WHERE id = $1",
        )
        .bind(&job.id)
        .bind(&job.conf)
        .bind(job.status.as_str())
        .bind(job.started)
        .bind(job.finished)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("update", "jobs", &job.id, result.rows_affected(), &[0, 1])?;
        debug!(table = "jobs", id = %job.id, "updated");
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, conf, status, started, finished FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Job::try_from).transpose()
    }

    /// True iff every site under `job_id` has a terminal status. Used by
    /// `_maybe_finish_job`; an empty result set (no sites yet) counts as
    /// "not all terminal" so a job is never finished before it has sites.
    pub async fn all_sites_terminal(&self, job_id: &str) -> Result<bool> {
        let statuses: Vec<(String,)> = sqlx::query_as("SELECT status FROM sites WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        if statuses.is_empty() {
            return Ok(false);
        }
        Ok(statuses.iter().all(|(s,)| {
            SiteStatus::parse(s)
                .map(SiteStatus::is_terminal)
                .unwrap_or(false)
        }))
    }

    // ---- sites ----

    pub async fn new_site(&self, site: &mut Site) -> Result<()> {
        if site.id.is_empty() {
            site.id = frontier_core::content_id(&[("job_id", &site.job_id), ("seed", &site.seed)]);
        }
        let result = sqlx::query(
            "INSERT INTO sites (id, job_id, seed, scope, proxy, ignore_robots, \
             enable_warcprox_features, extra_headers, time_limit, reached_limit, status, \
             claimed, last_claimed_by, claim_expiry, start_time, last_disclaimed) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(&site.id)
        .bind(&site.job_id)
        .bind(&site.seed)
        .bind(sqlx::types::Json(&site.scope))
        .bind(&site.proxy)
        .bind(site.ignore_robots)
        .bind(site.enable_warcprox_features)
        .bind(sqlx::types::Json(&site.extra_headers))
        .bind(site.time_limit)
        .bind(&site.reached_limit)
        .bind(site.status.as_str())
        .bind(site.claimed)
        .bind(&site.last_claimed_by)
        .bind(site.claim_expiry)
        .bind(site.start_time)
        .bind(site.last_disclaimed)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("insert", "sites", &site.id, result.rows_affected(), &[1])?;
        debug!(table = "sites", id = %site.id, "inserted");
        Ok(())
    }

    pub async fn update_site(&self, site: &Site) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sites SET job_id=$2, seed=$3, scope=$4, proxy=$5, ignore_robots=$6, \
             enable_warcprox_features=$7, extra_headers=$8, time_limit=$9, reached_limit=$10, \
             status=$11, claimed=$12, last_claimed_by=$13, claim_expiry=$14, start_time=$15, \
             last_disclaimed=$16 WHERE id=$1",
        )
        .bind(&site.id)
        .bind(&site.job_id)
        .bind(&site.seed)
        .bind(sqlx::types::Json(&site.scope))
        .bind(&site.proxy)
        .bind(site.ignore_robots)
        .bind(site.enable_warcprox_features)
        .bind(sqlx::types::Json(&site.extra_headers))
        .bind(site.time_limit)
        .bind(&site.reached_limit)
        .bind(site.status.as_str())
        .bind(site.claimed)
        .bind(&site.last_claimed_by)
        .bind(site.claim_expiry)
        .bind(site.start_time)
        .bind(site.last_disclaimed)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("update", "sites", &site.id, result.rows_affected(), &[0, 1])?;
        debug!(table = "sites", id = %site.id, "updated");
        Ok(())
    }

    pub async fn get_site(&self, id: &str) -> Result<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(Site::try_from).transpose()
    }

    /// All sites under a job, most recently started first. Used by the
    /// status CLI command; not on any hot path.
    pub async fn sites_for_job(&self, job_id: &str) -> Result<Vec<Site>> {
        let rows = sqlx::query_as::<_, SiteRow>(
            "SELECT * FROM sites WHERE job_id = $1 ORDER BY start_time DESC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(Site::try_from).collect()
    }

    /// Atomically claims the longest-idle active, unclaimed site.
    ///
    /// Grounded on the `SELECT ... FOR UPDATE SKIP LOCKED` + `UPDATE`
    /// transaction pattern: one worker's lock holds off every other
    /// concurrent caller from observing the same row as claimable.
    pub async fn claim_site(
        &self,
        worker_id: &str,
        claimable_last_disclaimed_max: f64,
        claim_lease_secs: f64,
    ) -> Result<Option<Site>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query_as::<_, SiteRow>(
            "SELECT * FROM sites \
             WHERE status = 'ACTIVE' AND claimed = false \
               AND last_disclaimed >= 0 AND last_disclaimed <= $1 \
             ORDER BY last_disclaimed ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(claimable_last_disclaimed_max)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            tx.commit().await.map_err(store_err)?;
            return Ok(None);
        };

        let now = frontier_core::now_epoch_secs();
        let result = sqlx::query(
            "UPDATE sites SET claimed = true, last_claimed_by = $2, claim_expiry = $3 \
             WHERE id = $1",
        )
        .bind(&row.id)
        .bind(worker_id)
        .bind(now + claim_lease_secs)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        vet("claim", "sites", &row.id, result.rows_affected(), &[1])?;

        tx.commit().await.map_err(store_err)?;

        let mut site = Site::try_from(row)?;
        site.claimed = true;
        site.last_claimed_by = Some(worker_id.to_string());
        site.claim_expiry = Some(now + claim_lease_secs);
        info!(site_id = %site.id, worker_id, "claimed site");
        Ok(Some(site))
    }

    // ---- pages ----

    pub async fn new_page(&self, page: &Page) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO pages (id, site_id, job_id, url, hops_from_seed, redirect_url, \
             priority, claimed, last_claimed_by, claim_expiry, brozzle_count, via_page_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&page.id)
        .bind(&page.site_id)
        .bind(&page.job_id)
        .bind(&page.url)
        .bind(page.hops_from_seed as i32)
        .bind(&page.redirect_url)
        .bind(page.priority)
        .bind(page.claimed)
        .bind(&page.last_claimed_by)
        .bind(page.claim_expiry)
        .bind(page.brozzle_count as i32)
        .bind(&page.via_page_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("insert", "pages", &page.id, result.rows_affected(), &[1])?;
        debug!(table = "pages", id = %page.id, "inserted");
        Ok(())
    }

    pub async fn update_page(&self, page: &Page) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pages SET site_id=$2, job_id=$3, url=$4, hops_from_seed=$5, \
             redirect_url=$6, priority=$7, claimed=$8, last_claimed_by=$9, claim_expiry=$10, \
             brozzle_count=$11, via_page_id=$12 WHERE id=$1",
        )
        .bind(&page.id)
        .bind(&page.site_id)
        .bind(&page.job_id)
        .bind(&page.url)
        .bind(page.hops_from_seed as i32)
        .bind(&page.redirect_url)
        .bind(page.priority)
        .bind(page.claimed)
        .bind(&page.last_claimed_by)
        .bind(page.claim_expiry)
        .bind(page.brozzle_count as i32)
        .bind(&page.via_page_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        vet("update", "pages", &page.id, result.rows_affected(), &[0, 1])?;
        debug!(table = "pages", id = %page.id, "updated");
        Ok(())
    }

    pub async fn get_page(&self, id: &str) -> Result<Option<Page>> {
        let row = sqlx::query_as::<_, PageRow>("SELECT * FROM pages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Page::from))
    }

    /// Atomically claims the highest-priority unclaimed, unprocessed page of
    /// a site. `brozzle_count = 0` in the predicate is what makes a done
    /// page invisible here without needing to delete it.
    pub async fn claim_page(
        &self,
        site_id: &str,
        worker_id: &str,
        claim_lease_secs: f64,
    ) -> Result<Option<Page>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query_as::<_, PageRow>(
            "SELECT * FROM pages \
             WHERE site_id = $1 AND brozzle_count = 0 AND claimed = false \
             ORDER BY priority DESC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(site_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            tx.commit().await.map_err(store_err)?;
            return Ok(None);
        };

        let now = frontier_core::now_epoch_secs();
        let result = sqlx::query(
            "UPDATE pages SET claimed = true, last_claimed_by = $2, claim_expiry = $3 \
             WHERE id = $1",
        )
        .bind(&row.id)
        .bind(worker_id)
        .bind(now + claim_lease_secs)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        vet("claim", "pages", &row.id, result.rows_affected(), &[1])?;

        tx.commit().await.map_err(store_err)?;

        let mut page = Page::from(row);
        page.claimed = true;
        page.last_claimed_by = Some(worker_id.to_string());
        page.claim_expiry = Some(now + claim_lease_secs);
        info!(page_id = %page.id, worker_id, "claimed page");
        Ok(Some(page))
    }

    /// Any row (claimed or not) still pending or in-flight for `site_id`.
    pub async fn has_outstanding_pages(&self, site_id: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM pages WHERE site_id = $1 AND brozzle_count = 0 LIMIT 1")
                .bind(site_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(row.is_some())
    }

    /// Adds `delta` to an existing page's stored priority in one statement,
    /// returning the new value. Used when a rediscovered page is already
    /// scheduled.
    pub async fn bump_page_priority(&self, id: &str, delta: i64) -> Result<i64> {
        let (priority,): (i64,) = sqlx::query_as(
            "UPDATE pages SET priority = priority + $2 WHERE id = $1 RETURNING priority",
        )
        .bind(id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        debug!(table = "pages", id, delta, priority, "bumped priority");
        Ok(priority)
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    conf: serde_json::Value,
    status: String,
    started: DateTime<Utc>,
    finished: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = FrontierError;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| FrontierError::Store(format!("unknown job status {}", row.status)))?;
        Ok(Job {
            id: row.id,
            conf: row.conf,
            status,
            started: row.started,
            finished: row.finished,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SiteRow {
    id: String,
    job_id: String,
    seed: String,
    scope: serde_json::Value,
    proxy: Option<String>,
    ignore_robots: bool,
    enable_warcprox_features: bool,
    extra_headers: serde_json::Value,
    time_limit: Option<f64>,
    reached_limit: Option<String>,
    status: String,
    claimed: bool,
    last_claimed_by: Option<String>,
    claim_expiry: Option<f64>,
    start_time: f64,
    last_disclaimed: f64,
}

impl TryFrom<SiteRow> for Site {
    type Error = FrontierError;

    fn try_from(row: SiteRow) -> Result<Self> {
        let status = SiteStatus::parse(&row.status)
            .ok_or_else(|| FrontierError::Store(format!("unknown site status {}", row.status)))?;
        let scope: Scope = serde_json::from_value(row.scope)
            .map_err(|e| FrontierError::Store(format!("bad scope json: {e}")))?;
        let extra_headers = serde_json::from_value(row.extra_headers)
            .map_err(|e| FrontierError::Store(format!("bad extra_headers json: {e}")))?;
        Ok(Site {
            id: row.id,
            job_id: row.job_id,
            seed: row.seed,
            scope,
            proxy: row.proxy,
            ignore_robots: row.ignore_robots,
            enable_warcprox_features: row.enable_warcprox_features,
            extra_headers,
            time_limit: row.time_limit,
            reached_limit: row.reached_limit,
            status,
            claimed: row.claimed,
            last_claimed_by: row.last_claimed_by,
            claim_expiry: row.claim_expiry,
            start_time: row.start_time,
            last_disclaimed: row.last_disclaimed,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PageRow {
    id: String,
    site_id: String,
    job_id: String,
    url: String,
    hops_from_seed: i32,
    redirect_url: Option<String>,
    priority: i64,
    claimed: bool,
    last_claimed_by: Option<String>,
    claim_expiry: Option<f64>,
    brozzle_count: i32,
    via_page_id: Option<String>,
}

impl From<PageRow> for Page {
    fn from(row: PageRow) -> Self {
        Page {
            id: row.id,
            site_id: row.site_id,
            job_id: row.job_id,
            url: row.url,
            hops_from_seed: row.hops_from_seed as u32,
            redirect_url: row.redirect_url,
            priority: row.priority,
            claimed: row.claimed,
            last_claimed_by: row.last_claimed_by,
            claim_expiry: row.claim_expiry,
            brozzle_count: row.brozzle_count as u32,
            via_page_id: row.via_page_id,
        }
    }
}

/// A fresh, isolated test database per call: connects to the admin
/// database named in `DATABASE_URL`, creates a uniquely-named sibling
/// database, runs migrations on it, and returns a [`Store`] pointed there.
/// Mirrors the corpus's per-test `setup_test_db()` convention, adapted to
/// Postgres (which has no in-memory mode): isolation comes from a fresh
/// database rather than a fresh connection.
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    pub async fn fresh_test_store(admin_database_url: &str) -> Store {
        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(admin_database_url)
            .await
            .expect("connect to admin database");

        let suffix = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let dbname = format!("frontier_test_{pid}_{suffix}");
        sqlx::query(&format!("CREATE DATABASE {dbname}"))
            .execute(&admin_pool)
            .await
            .expect("create test database");

        let mut url = url::Url::parse(admin_database_url).expect("parse DATABASE_URL");
        url.set_path(&format!("/{dbname}"));

        let store = Store::new(url.as_str(), 5)
            .await
            .expect("connect to test database");
        store.run_migrations().await.expect("run migrations");
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    #[tokio::test]
    async fn claim_round_trip_against_real_postgres() {
        let Some(url) = pg_url() else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };
        let store = testing::fresh_test_store(&url).await;

        let mut job = Job::new("", serde_json::json!({}));
        store.new_job(&mut job).await.expect("new_job");

        let mut site = Site::new("http://example.com/", job.id.clone());
        store.new_site(&mut site).await.expect("new_site");

        let claimed = store
            .claim_site("w1", 2.5e11, 600.0)
            .await
            .expect("claim_site")
            .expect("a site to claim");
        assert_eq!(claimed.id, site.id);
        assert!(claimed.claimed);

        let second = store
            .claim_site("w2", 2.5e11, 600.0)
            .await
            .expect("claim_site");
        assert!(second.is_none());
    }
}
