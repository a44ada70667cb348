mod cli;

use anyhow::Result;
use clap::Parser;
use frontier_core::config::AppConfig;
use frontier_frontier::Frontier;
use frontier_store::Store;
use tracing::warn;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str)?;

    let store = Store::new(
        &config.database.postgres_url,
        config.database.max_connections,
    )
    .await?;
    store.run_migrations().await?;
    let frontier = Frontier::new(store, config.frontier);

    match cli.command {
        Commands::LoadJob { path } => {
            let job = frontier_job::new_job_file(&frontier, &path).await?;
            println!("loaded job {} (status: {:?})", job.id, job.status);
        }
        Commands::Status { job_id } => {
            run_status(&frontier, &job_id).await?;
        }
        Commands::ClaimDemo { worker_id } => {
            run_claim_demo(&frontier, &worker_id).await?;
        }
    }

    Ok(())
}

async fn run_status(frontier: &Frontier, job_id: &str) -> Result<()> {
    let Some(job) = frontier.store().get_job(job_id).await? else {
        println!("no such job: {job_id}");
        return Ok(());
    };
    println!("job {} — {:?}", job.id, job.status);
    println!("  started:  {}", job.started);
    if let Some(finished) = job.finished {
        println!("  finished: {finished}");
    }

    let sites = frontier.store().sites_for_job(&job.id).await?;
    println!("  sites ({}):", sites.len());
    for site in sites {
        println!(
            "    {} — {:?} seed={} claimed={}",
            site.id, site.status, site.seed, site.claimed
        );
    }
    Ok(())
}

async fn run_claim_demo(frontier: &Frontier, worker_id: &str) -> Result<()> {
    let mut site = frontier.claim_site(worker_id).await?;
    println!("claimed site {} (seed {})", site.id, site.seed);

    match frontier.claim_page(&site, worker_id).await {
        Ok(mut page) => {
            println!("claimed page {} ({})", page.id, page.url);
            frontier.completed_page(&mut site, &mut page).await?;
            frontier.disclaim_site(&mut site, Some(&mut page)).await?;
        }
        Err(frontier_core::FrontierError::NothingToClaim) => {
            println!("site has no outstanding pages");
            frontier.disclaim_site(&mut site, None).await?;
        }
        Err(e) => return Err(e.into()),
    }

    println!("disclaimed site {}", site.id);
    Ok(())
}
