//! `parallax research` - create, refine, run, and inspect research records.

use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{ProviderKind, Research};

use super::App;

#[derive(Args)]
pub struct ResearchArgs {
    #[command(subcommand)]
    pub command: ResearchCommands,
}

#[derive(Subcommand)]
pub enum ResearchCommands {
    /// Create a research record and open the clarification session
    New {
        /// Topic to research
        topic: String,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
    },
    /// List research records for an owner
    List {
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
        /// Page size
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Continuation cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Show one research record
    Show {
        id: Uuid,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
    },
    /// Answer a clarifying question
    Answer {
        id: Uuid,
        /// Question index being answered
        #[arg(long)]
        index: u32,
        /// The answer text
        #[arg(long)]
        text: String,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
    },
    /// Show the Q/A view for resuming a clarification session
    Hydrate {
        id: Uuid,
        /// Index of the question currently on screen
        #[arg(long, default_value_t = 1)]
        index: u32,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
    },
    /// Start the parallel provider run
    Run {
        id: Uuid,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
        /// Poll until the run reaches a terminal status
        #[arg(long)]
        wait: bool,
    },
    /// Re-run a single provider after a partial failure
    Retry {
        id: Uuid,
        /// Which provider to re-run: primary or secondary
        #[arg(long)]
        provider: String,
        #[arg(long, env = "PARALLAX_OWNER", default_value = "local")]
        owner: String,
    },
}

pub async fn execute(args: ResearchArgs, json: bool) -> anyhow::Result<()> {
    let app = App::init().await?;

    match args.command {
        ResearchCommands::New { topic, owner } => {
            let research = app.research.create_research(&owner, &topic).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&research)?);
            } else {
                println!("Created research {}", research.id);
                if let Some(question) = research.primary.questions.first() {
                    println!("Question {}: {}", question.index, question.text);
                    println!(
                        "Answer with: parallax research answer {} --index {} --text \"...\"",
                        research.id, question.index
                    );
                }
            }
        }

        ResearchCommands::List { owner, limit, cursor } => {
            let page = app.research.list_research(&owner, limit, cursor.as_deref()).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "items": page.items,
                        "next_cursor": page.next_cursor,
                    })
                );
            } else {
                print_research_table(&page.items);
                if let Some(cursor) = page.next_cursor {
                    println!("More results: --cursor {cursor}");
                }
            }
        }

        ResearchCommands::Show { id, owner } => {
            let research = app.research.get_research(id, &owner).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&research)?);
            } else {
                print_research_detail(&research);
            }
        }

        ResearchCommands::Answer { id, index, text, owner } => {
            let outcome = app.refinement.submit_answer(id, &owner, &text, index).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": outcome.research.status.as_str(),
                        "next_question": outcome.next_question,
                        "final_prompt": outcome.final_prompt,
                    })
                );
            } else if let Some(question) = outcome.next_question {
                println!("Question {}: {}", question.index, question.text);
            } else if let Some(prompt) = outcome.final_prompt {
                println!("Refinement complete. Final prompt:\n{prompt}");
                println!("Start the run with: parallax research run {id}");
            }
        }

        ResearchCommands::Hydrate { id, index, owner } => {
            let view = app.refinement.hydrate(id, &owner, index).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "research_id": view.research_id,
                        "status": view.status.as_str(),
                        "questions": view.questions,
                        "answers": view.answers,
                        "current_question": view.current_question,
                        "final_prompt": view.final_prompt,
                    })
                );
            } else {
                println!("Status: {}", view.status.as_str());
                for question in &view.questions {
                    let answer = view
                        .answers
                        .iter()
                        .find(|a| a.index == question.index)
                        .map_or("(unanswered)", |a| a.answer.as_str());
                    println!("  Q{}: {}", question.index, question.text);
                    println!("  A{}: {}", question.index, answer);
                }
                if let Some(prompt) = view.final_prompt {
                    println!("Final prompt: {prompt}");
                }
            }
        }

        ResearchCommands::Run { id, owner, wait } => {
            let outcome = app.scheduler.schedule_run(id, &owner).await?;
            if json && !wait {
                println!(
                    "{}",
                    serde_json::json!({
                        "research": outcome.research,
                        "already_running": outcome.already_running,
                    })
                );
            } else if outcome.already_running {
                println!("Run already in progress for {id}");
            } else {
                println!("Run started for {id}");
            }
            if wait {
                let research = wait_for_terminal(&app, id, &owner).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&research)?);
                } else {
                    print_research_detail(&research);
                }
            }
        }

        ResearchCommands::Retry { id, provider, owner } => {
            let kind = ProviderKind::from_str(&provider).ok_or_else(|| {
                DomainError::ValidationFailed(format!(
                    "unknown provider '{provider}', expected primary or secondary"
                ))
            })?;
            let outcome = app.scheduler.retry_provider(kind, id, &owner).await?;
            if outcome.already_running {
                println!("{} provider already running for {id}", kind.as_str());
            } else {
                println!("Retry started for {} provider of {id}", kind.as_str());
            }
        }
    }

    Ok(())
}

async fn wait_for_terminal(app: &App, id: Uuid, owner: &str) -> anyhow::Result<Research> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    loop {
        let research = app.research.get_research(id, owner).await?;
        if research.status.is_terminal() {
            spinner.finish_with_message(format!("Run {}", research.status.as_str()));
            return Ok(research);
        }
        spinner.set_message(format!(
            "{} (primary: {}, secondary: {})",
            research.status.as_str(),
            research.primary.status.as_str(),
            research.secondary.status.as_str()
        ));
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

fn print_research_table(items: &[Research]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Title", "Status", "Primary", "Secondary", "Created"]);
    for research in items {
        table.add_row(vec![
            Cell::new(research.id),
            Cell::new(&research.title),
            Cell::new(research.status.as_str()),
            Cell::new(research.primary.status.as_str()),
            Cell::new(research.secondary.status.as_str()),
            Cell::new(research.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
}

fn print_research_detail(research: &Research) {
    println!("Research {}", research.id);
    println!("  Title:   {}", research.title);
    println!("  Owner:   {}", research.owner_uid);
    println!("  Status:  {}", research.status.as_str());
    println!("  Created: {}", research.created_at.to_rfc3339());
    println!("  Updated: {}", research.updated_at.to_rfc3339());

    for (label, state) in [("Primary", &research.primary), ("Secondary", &research.secondary)] {
        println!("  {label}: {}", state.status.as_str());
        if let Some(result) = &state.result {
            println!("    Summary: {}", result.summary);
            for finding in &result.findings {
                println!("    - {finding}");
            }
        }
        if let Some(error) = &state.error {
            println!("    Error: {error}");
        }
        if let Some(duration) = state.duration_ms {
            println!("    Duration: {duration}ms");
        }
    }

    if research.report.as_object().is_some_and(|m| !m.is_empty()) {
        println!("  Report: {}", research.report);
    }
}
