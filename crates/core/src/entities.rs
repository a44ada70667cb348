use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::canon::{canonicalize, path_of};

/// A site's lifecycle state. Terminal states are absorbing — once a site
/// reaches one, it is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Active,
    Finished,
    FinishedTimeLimit,
    FinishedReachedLimit,
}

impl SiteStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SiteStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Active => "ACTIVE",
            SiteStatus::Finished => "FINISHED",
            SiteStatus::FinishedTimeLimit => "FINISHED_TIME_LIMIT",
            SiteStatus::FinishedReachedLimit => "FINISHED_REACHED_LIMIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SiteStatus::Active),
            "FINISHED" => Some(SiteStatus::Finished),
            "FINISHED_TIME_LIMIT" => Some(SiteStatus::FinishedTimeLimit),
            "FINISHED_REACHED_LIMIT" => Some(SiteStatus::FinishedReachedLimit),
            _ => None,
        }
    }
}

/// A job's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Active,
    Finished,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Active => "ACTIVE",
            JobStatus::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(JobStatus::Active),
            "FINISHED" => Some(JobStatus::Finished),
            _ => None,
        }
    }
}

/// A crawl unit rooted at a seed URL, with a scope and lifecycle.
///
/// `scope.surt` is the canonical prefix in-scope URLs must start with;
/// `max_hops`, when set, additionally bounds how many hops from the seed a
/// page may be before its outlinks are rejected regardless of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub surt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub job_id: String,
    pub seed: String,
    pub scope: Scope,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub ignore_robots: bool,
    #[serde(default)]
    pub enable_warcprox_features: bool,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub time_limit: Option<f64>,
    #[serde(default)]
    pub reached_limit: Option<String>,
    pub status: SiteStatus,
    pub claimed: bool,
    #[serde(default)]
    pub last_claimed_by: Option<String>,
    /// `now + claim_lease_secs` set on every claim; no reader currently acts
    /// on it (there is no sweeper in this core), but it makes one possible.
    #[serde(default)]
    pub claim_expiry: Option<f64>,
    pub start_time: f64,
    #[serde(default)]
    pub last_disclaimed: f64,
}

impl Site {
    /// Build a new site from a seed URL. `id` and `job_id` are filled in by
    /// the store and job loader respectively.
    pub fn new(seed: impl Into<String>, job_id: impl Into<String>) -> Self {
        let seed = seed.into();
        let surt = canonicalize(&seed);
        Site {
            id: String::new(),
            job_id: job_id.into(),
            seed,
            scope: Scope {
                surt,
                max_hops: None,
            },
            proxy: None,
            ignore_robots: false,
            enable_warcprox_features: false,
            extra_headers: HashMap::new(),
            time_limit: None,
            reached_limit: None,
            status: SiteStatus::Active,
            claimed: false,
            last_claimed_by: None,
            claim_expiry: None,
            start_time: now_epoch_secs(),
            last_disclaimed: 0.0,
        }
    }

    /// When a seed-hop page redirects, widen the site's scope to cover the
    /// redirect target if the target isn't already covered.
    ///
    /// Rationale: redirects off the seed domain would otherwise make the
    /// whole crawl out of scope (e.g. `http://a.example.com/` redirecting to
    /// `http://b.example.com/`).
    pub fn note_seed_redirect(&mut self, url: &str) {
        let new_surt = canonicalize(url);
        if !new_surt.starts_with(&self.scope.surt) {
            tracing::info!(
                old_surt = %self.scope.surt,
                new_surt = %new_surt,
                "widening site scope after seed redirect"
            );
            self.scope.surt = new_surt;
        }
    }
}

/// A single URL scheduled for (or completed by) one crawl.
///
/// `id` is a deterministic SHA-1 hash of `(site_id, canonical_url)`, so
/// re-scheduling the same URL within a site is a primary-key collision,
/// handled by the frontier as "add to the existing priority" rather than a
/// duplicate insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub site_id: String,
    pub job_id: String,
    pub url: String,
    pub hops_from_seed: u32,
    #[serde(default)]
    pub redirect_url: Option<String>,
    pub priority: i64,
    pub claimed: bool,
    #[serde(default)]
    pub last_claimed_by: Option<String>,
    #[serde(default)]
    pub claim_expiry: Option<f64>,
    pub brozzle_count: u32,
    #[serde(default)]
    pub via_page_id: Option<String>,
}

impl Page {
    /// Build a page for `url` within `site_id`/`job_id`. `priority`, when
    /// `None`, is computed by [`crate::priority::priority`]; pass
    /// `Some(1000)` for seed pages so they dominate the claim queue.
    pub fn new(
        url: impl Into<String>,
        site_id: impl Into<String>,
        job_id: impl Into<String>,
        hops_from_seed: u32,
        via_page_id: Option<String>,
        priority: Option<i64>,
    ) -> Self {
        let url = url.into();
        let site_id = site_id.into();
        let canon = canonicalize(&url);
        let id = page_id(&site_id, &canon);
        let priority =
            priority.unwrap_or_else(|| crate::priority::priority(hops_from_seed, &path_of(&url)));
        Page {
            id,
            site_id,
            job_id: job_id.into(),
            url,
            hops_from_seed,
            redirect_url: None,
            priority,
            claimed: false,
            last_claimed_by: None,
            claim_expiry: None,
            brozzle_count: 0,
            via_page_id,
        }
    }

    pub fn canon_url(&self) -> String {
        canonicalize(&self.url)
    }
}

/// `sha1("site_id:{site_id},canon_url:{canon_url}")` hex-encoded.
pub fn page_id(site_id: &str, canon_url: &str) -> String {
    content_id(&[("site_id", site_id), ("canon_url", canon_url)])
}

/// Deterministic id for an entity that, unlike [`Page`], has no natural
/// content hash of its own (jobs, sites): `sha1` of the given labeled
/// fields, joined the same way as [`page_id`]. Used by the store adapter
/// to assign ids on insert when the caller leaves `id` empty.
pub fn content_id(fields: &[(&str, &str)]) -> String {
    let digest_this = fields
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(",");
    let mut hasher = Sha1::new();
    hasher.update(digest_this.as_bytes());
    hex::encode(hasher.finalize())
}

/// A container of sites sharing configuration, with its own completion
/// lifecycle: `ACTIVE -> FINISHED` once every site under it is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub conf: Value,
    pub status: JobStatus,
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, conf: Value) -> Self {
        Job {
            id: id.into(),
            conf,
            status: JobStatus::Active,
            started: Utc::now(),
            finished: None,
        }
    }
}

/// Tallies returned by `scope_and_schedule_outlinks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutlinkCounts {
    pub added: u32,
    pub updated: u32,
    pub rejected: u32,
    pub blocked: u32,
}

pub fn now_epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
