//! Recast CLI: resumable long-document reconstruction.
//!
//! Plans a target length, extracts a structural skeleton, regenerates the
//! document chunk by chunk against it, and stitches the result. Jobs live in
//! a local database and can be resumed after any interruption.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
