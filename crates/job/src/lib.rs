mod merge;

pub use merge::merge;

use frontier_core::priority::SEED_PRIORITY;
use frontier_core::{FrontierError, Job, Page, Result, Scope, Site};
use frontier_frontier::Frontier;
use serde_json::Value;
use tracing::{info, warn};

/// Reads a job configuration document from a YAML file and loads it.
pub async fn new_job_file(frontier: &Frontier, path: &str) -> Result<Job> {
    info!(path, "loading job file");
    let contents = std::fs::read_to_string(path)
        .map_err(|e| FrontierError::InvalidConfig(format!("reading {path}: {e}")))?;
    new_job_from_yaml(frontier, &contents).await
}

/// Parses a YAML job configuration document and loads it.
pub async fn new_job_from_yaml(frontier: &Frontier, yaml: &str) -> Result<Job> {
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| FrontierError::InvalidConfig(format!("parsing yaml: {e}")))?;
    let job_conf: Value = serde_json::to_value(yaml_value)
        .map_err(|e| FrontierError::InvalidConfig(format!("converting yaml to json: {e}")))?;
    new_job(frontier, job_conf).await
}

/// Validates a job configuration document, expands it into sites and seed
/// pages, and hands them to the frontier.
///
/// Each seed's configuration is deep-merged over the job-level
/// configuration (see [`merge`]) before becoming a [`Site`].
pub async fn new_job(frontier: &Frontier, job_conf: Value) -> Result<Job> {
    let id = job_conf
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut job = Job::new(id, job_conf.clone());
    frontier.new_job(&mut job).await?;

    let seeds = job_conf
        .get("seeds")
        .and_then(Value::as_array)
        .ok_or_else(|| FrontierError::InvalidConfig("job conf missing \"seeds\" list".into()))?;

    let mut sites = Vec::with_capacity(seeds.len());
    for seed_conf in seeds {
        let merged = merge(seed_conf.clone(), job_conf.clone());
        sites.push(site_from_merged_conf(&job.id, &merged)?);
    }

    for site in sites {
        new_site(frontier, site).await?;
    }

    Ok(job)
}

fn site_from_merged_conf(job_id: &str, merged: &Value) -> Result<Site> {
    let url = merged
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| FrontierError::InvalidConfig("seed missing \"url\"".into()))?;

    let mut site = Site::new(url, job_id.to_string());

    if let Some(scope_conf) = merged.get("scope") {
        let scope: Scope = serde_json::from_value(scope_conf.clone())
            .map_err(|e| FrontierError::InvalidConfig(format!("bad scope: {e}")))?;
        site.scope = scope;
    }
    if let Some(time_limit) = merged.get("time_limit").and_then(Value::as_f64) {
        site.time_limit = Some(time_limit);
    }
    if let Some(proxy) = merged.get("proxy").and_then(Value::as_str) {
        site.proxy = Some(proxy.to_string());
    }
    if let Some(ignore_robots) = merged.get("ignore_robots").and_then(Value::as_bool) {
        site.ignore_robots = ignore_robots;
    }
    if let Some(enable) = merged
        .get("enable_warcprox_features")
        .and_then(Value::as_bool)
    {
        site.enable_warcprox_features = enable;
    }
    if let Some(warcprox_meta) = merged.get("warcprox_meta") {
        let serialized = serde_json::to_string(warcprox_meta)
            .map_err(|e| FrontierError::InvalidConfig(format!("bad warcprox_meta: {e}")))?;
        site.extra_headers
            .insert("Warcprox-Meta".to_string(), serialized);
    }

    Ok(site)
}

/// Inserts `site` and, if robots permits, its seed page. A `ReachedLimit`
/// from the robots check finishes the site rather than propagating.
async fn new_site(frontier: &Frontier, mut site: Site) -> Result<()> {
    frontier.new_site(&mut site).await?;
    match frontier
        .is_permitted_by_robots(&site, &site.seed.clone())
        .await
    {
        Ok(true) => {
            let page = Page::new(
                site.seed.clone(),
                site.id.clone(),
                site.job_id.clone(),
                0,
                None,
                Some(SEED_PRIORITY),
            );
            frontier.new_page(&page).await?;
            info!(page_id = %page.id, "queued seed page");
        }
        Ok(false) => {
            warn!(site_id = %site.id, seed = %site.seed, "seed url blocked by robots.txt");
        }
        Err(FrontierError::ReachedLimit { marker }) => {
            frontier.reached_limit(&mut site, marker).await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier_core::FrontierConfig;

    async fn test_frontier() -> Option<Frontier> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = frontier_store::testing::fresh_test_store(&url).await;
        Some(Frontier::new(store, FrontierConfig::default()))
    }

    #[tokio::test]
    async fn loads_single_seed_job() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let yaml = r#"
seeds:
  - url: "http://example.com/"
"#;
        let job = new_job_from_yaml(&frontier, yaml).await.unwrap();
        assert_eq!(job.status, frontier_core::JobStatus::Active);

        let site = frontier
            .store()
            .get_site(&frontier_core::content_id(&[
                ("job_id", &job.id),
                ("seed", "http://example.com/"),
            ]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(site.seed, "http://example.com/");
        assert_eq!(site.scope.surt, "http://(com,example,)/");
    }

    #[tokio::test]
    async fn seed_overrides_job_level_config() {
        let Some(frontier) = test_frontier().await else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };

        let yaml = r#"
time_limit: 100
seeds:
  - url: "http://example.com/"
    time_limit: 5
"#;
        let job = new_job_from_yaml(&frontier, yaml).await.unwrap();
        let site = frontier
            .store()
            .get_site(&frontier_core::content_id(&[
                ("job_id", &job.id),
                ("seed", "http://example.com/"),
            ]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(site.time_limit, Some(5.0));
    }
}
