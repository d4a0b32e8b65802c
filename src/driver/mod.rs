pub mod appium;
pub mod traits;

use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Duration;

/// Print readiness of the automation server
pub async fn check_server(server_url: &str, timeout: Duration) -> Result<()> {
    let status = appium::server_status(server_url, timeout)
        .await
        .with_context(|| format!("Failed to query server status at {}", server_url))?;

    if status.ready {
        println!("{} Server ready: {}", "✓".green(), server_url.cyan());
    } else {
        println!("{} Server not ready: {}", "✗".red(), server_url.cyan());
    }
    if !status.message.is_empty() {
        println!("  {}", status.message);
    }

    Ok(())
}
