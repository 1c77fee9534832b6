//! Prompts command handler.
//!
//! Lists the prompt contracts in effect for the workspace, built-in or overridden.

use clap::Args;
use faqroute_core::{config::AppConfig, AppResult};
use faqroute_prompt::{list_prompts, load_prompt, OutputFormat};

/// List prompt contracts
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Print the full definition of one prompt
    #[arg(long)]
    pub show: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    /// Execute the prompts command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if let Some(ref id) = self.show {
            let definition = load_prompt(&config.workspace, id)?;
            if self.json {
                println!("{}", serde_json::to_string_pretty(&definition)?);
            } else {
                print!("{}", serde_yaml::to_string(&definition)?);
            }
            return Ok(());
        }

        let ids = list_prompts(&config.workspace)?;
        tracing::debug!("Found {} prompt contracts", ids.len());

        let mut definitions = Vec::with_capacity(ids.len());
        for id in &ids {
            match load_prompt(&config.workspace, id) {
                Ok(definition) => definitions.push(definition),
                Err(e) => tracing::warn!("Skipping prompt '{}': {}", id, e),
            }
        }

        if self.json {
            let output: Vec<_> = definitions
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "title": d.title,
                        "format": d.output.format,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for d in &definitions {
                let format = match d.output.format {
                    OutputFormat::Text => "text",
                    OutputFormat::Json => "json",
                };
                println!("{:<20} {:<5} {}", d.id, format, d.title);
            }
        }

        Ok(())
    }
}
