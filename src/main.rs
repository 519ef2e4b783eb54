use clap::Parser;

use beacon_hunt_lib::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    beacon_hunt_lib::run(Cli::parse()).await
}
