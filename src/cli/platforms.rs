//! CLI command for listing supported platforms

use crate::platform::Platform;
use crate::transport::presenter::platform_table;
use clap::Args;
use serde_json::json;

use super::CliError;

/// Platforms subcommand
#[derive(Debug, Args)]
pub struct PlatformsCommand {
    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Output format for the platforms command
#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl PlatformsCommand {
    /// Print the platform table
    pub fn execute(&self) -> Result<(), CliError> {
        println!("{}", self.render()?);
        Ok(())
    }

    /// Rendered output
    pub fn render(&self) -> Result<String, CliError> {
        match self.format {
            OutputFormat::Human => Ok(platform_table()),
            OutputFormat::Json => {
                let platforms: Vec<_> = Platform::ALL
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.id(),
                            "name": p.display_name(),
                            "emoji": p.emoji(),
                            "kinds": p.capabilities(),
                            "asks_for_kind": p.needs_choice(),
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&platforms)
                    .map_err(|e| CliError::InvalidArgument(format!("cannot render JSON: {e}")))
            }
        }
    }
}
