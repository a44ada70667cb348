use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    /// Upper bound on `last_disclaimed` (epoch seconds) a site may have and
    /// still be claimable. Excludes the far-future "never disclaimed"
    /// sentinel (see [`NEVER_DISCLAIMED_SENTINEL`]).
    #[serde(default = "default_claimable_last_disclaimed_max")]
    pub claimable_last_disclaimed_max: f64,
    /// How long a claim is leased for before it's eligible for recovery by
    /// an external sweeper. The source has no lease expiry at all; this
    /// column/field exists so a sweeper *can* be built, per DESIGN.md.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: f64,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        FrontierConfig {
            claimable_last_disclaimed_max: default_claimable_last_disclaimed_max(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

/// Sentinel used for a site that should never be claimed via the normal
/// longest-idle ordering (e.g. a site seeded with a deliberately far-future
/// `last_disclaimed`). `claimable_last_disclaimed_max` is set well below
/// this so such sites are excluded from the claim range scan.
pub const NEVER_DISCLAIMED_SENTINEL: f64 = 1e18;

fn default_claimable_last_disclaimed_max() -> f64 {
    2.5e11
}

fn default_claim_lease_secs() -> f64 {
    600.0
}
