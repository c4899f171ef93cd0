use anyhow::Result;
use exportapi::{Client, Conjunction, ExportParams, PollLimit};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Configure the service via env vars or a `.exportapirc` file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("exportapi=info")),
        )
        .init();

    let client = Client::from_env()?
        .with_poll_interval(Duration::from_secs(2))
        .with_poll_limit(PollLimit::Deadline(Duration::from_secs(15 * 60)));

    let params = ExportParams::builder()
        .select(["name", "state", "population"])
        .search("county|parish")
        .where_clause("population > 100000")
        .conjunction(Conjunction::And)
        .build()?;

    let handle = client.export(
        "us.gov.census.counties",
        &params,
        Some(Path::new("counties.csv.gz")),
    )?;
    println!("{}", handle);
    println!("columns: {}", handle.columns()?.join(", "));
    Ok(())
}
