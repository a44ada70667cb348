use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "crawl-frontier-tool",
    about = "Crawl frontier coordination core"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a job configuration file, creating its sites and seed pages
    LoadJob {
        /// Path to a YAML job configuration file
        path: String,
    },
    /// Show a job's status and its sites' progress
    Status {
        /// Job id
        job_id: String,
    },
    /// Claim one site and one of its pages, then disclaim them (demo)
    ClaimDemo {
        /// Worker id to claim as
        #[arg(short, long, default_value = "demo-worker")]
        worker_id: String,
    },
}
