//! Interactive mode for the server.
//!
//! Prompts for the bind address, port, feature table, and risk threshold
//! before starting the server.

use dialoguer::{Confirm, Input};

use crate::config::ServerConfig;

/// Runs the server in interactive mode, prompting for configuration.
///
/// Defaults come from the current environment. Answers are written back to
/// the corresponding environment variables (`BIND_ADDR`, `PORT`,
/// `FEATURE_TABLE_PATH`, `MIN_RISK`) before delegating to
/// [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Accident Risk Server");
    println!();

    let current = ServerConfig::from_env().unwrap_or_default();

    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default(current.bind_addr.clone())
        .interact_text()
        .unwrap_or(current.bind_addr);

    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(current.port)
        .interact_text()
        .unwrap_or(current.port);

    let default_table = current.feature_table_path.display().to_string();
    let feature_table: String = Input::new()
        .with_prompt("Feature table (CSV)")
        .default(default_table.clone())
        .interact_text()
        .unwrap_or(default_table);

    let min_risk: f64 = Input::new()
        .with_prompt("Minimum predicted risk")
        .default(current.min_risk)
        .validate_with(|v: &f64| {
            if (0.0..=1.0).contains(v) {
                Ok(())
            } else {
                Err("must be between 0 and 1")
            }
        })
        .interact_text()
        .unwrap_or(current.min_risk);

    // SAFETY: We are single-threaded at this point (before server starts) and
    // these variables are only read once during server initialisation.
    unsafe {
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", port.to_string());
        std::env::set_var("FEATURE_TABLE_PATH", &feature_table);
        std::env::set_var("MIN_RISK", min_risk.to_string());
    }

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}
