//! alphastrat – command-line front end for the AlphaStrat engine

use alphastrat::cli::Cli;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    Cli::parse().execute().await
}
