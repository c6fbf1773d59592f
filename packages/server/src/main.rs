#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the accident risk map.
//!
//! ```text
//! accident_risk_server                # configure from the environment
//! accident_risk_server --interactive  # prompt for configuration
//! ```

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "accident_risk_server",
    about = "Serve accident hotspots and segment risk scores"
)]
struct Cli {
    /// Prompt for bind address, port, and data paths before starting
    #[arg(long)]
    interactive: bool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    if cli.interactive {
        return accident_risk_server::interactive::run().await;
    }

    accident_risk_server::run_server().await
}
