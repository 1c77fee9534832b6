//! Ask command handler.
//!
//! Runs one question through the routing pipeline and prints the answer.

use crate::runtime::Runtime;
use clap::Args;
use faqroute_core::{config::AppConfig, AppError, AppResult};
use faqroute_pipeline::{AskRequest, AskResponse, ChatTurn, ConversationContext, Reply};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ask a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Prior chat turns as a JSON array of {role, content}
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Conversation context file, read before and rewritten after the question
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Stream the answer token by token when it comes from the FAQ
    #[arg(long)]
    pub stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::InvalidRequest("No question provided".to_string()))?;

        let history: Vec<ChatTurn> = match self.history {
            Some(ref path) => read_json(path)?,
            None => Vec::new(),
        };
        let context: ConversationContext = match self.context {
            Some(ref path) if path.exists() => read_json(path)?,
            _ => ConversationContext::default(),
        };

        let runtime = Runtime::build(config).await?;
        let request = AskRequest {
            question,
            history,
            context,
            stream: self.stream,
        };

        let outcome = runtime.pipeline.ask(request).await?;

        if let Some(ref path) = self.context {
            let json = serde_json::to_string_pretty(&outcome.context)?;
            std::fs::write(path, json)?;
            tracing::debug!("Wrote conversation context to {:?}", path);
        }

        match outcome.reply {
            Reply::Complete(response) => {
                if self.json {
                    let output = serde_json::json!({
                        "response": response,
                        "context": outcome.context,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    print_response(&response)?;
                }
            }
            Reply::Stream(mut events) => {
                let mut stdout = std::io::stdout();
                while let Some(event) = events.recv().await {
                    if self.json {
                        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                    } else if let faqroute_pipeline::StreamEvent::Token { value } = event {
                        write!(stdout, "{}", value)?;
                        stdout.flush()?;
                    }
                }
                if !self.json {
                    writeln!(stdout)?;
                }
            }
        }

        Ok(())
    }

    /// Get the question text from the argument or the file.
    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(ref question) = self.question {
            return Ok(Some(question.clone()));
        }
        match self.file {
            Some(ref path) => Ok(Some(std::fs::read_to_string(path)?)),
            None => Ok(None),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("Failed to parse {:?}: {}", path, e)))
}

/// Plain-text rendering: the answer, then one line per listed record.
fn print_response(response: &AskResponse) -> AppResult<()> {
    println!("{}", response.content());

    if let AskResponse::TextCollection {
        title,
        schema,
        items,
        ..
    } = response
    {
        println!();
        println!("{} ({})", title, schema.join(", "));
        for item in items {
            let cells: Vec<String> = schema
                .iter()
                .map(|field| match item.get(field) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(value) => value.to_string(),
                    None => String::new(),
                })
                .collect();
            println!("  {}", cells.join(" | "));
        }
    }
    Ok(())
}
