//! Interactive terminal menu

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use nim_bench_core::{LoadLevel, Operator};
use nim_bench_storage::{AddOutcome, NimEntry, NimRegistry};

use crate::app::{App, TestMode};

/// Read one line from stdin after printing `question`
///
/// Returns `None` at end of input.
pub async fn prompt(question: &str) -> Result<Option<String>> {
    let question = question.to_string();
    tokio::task::spawn_blocking(move || -> Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{question}")?;
        stdout.flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    })
    .await
    .context("stdin reader task failed")?
}

/// Like [`prompt`], but end of input is an error
async fn ask(question: &str) -> Result<String> {
    match prompt(question).await? {
        Some(answer) => Ok(answer),
        None => bail!("input closed"),
    }
}

async fn ask_number(question: &str) -> Result<u32> {
    let answer = ask(question).await?;
    answer
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .with_context(|| format!("'{answer}' is not a positive whole number"))
}

/// Whether a yes/no answer means yes
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks the person at the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinOperator;

#[async_trait]
impl Operator for StdinOperator {
    async fn confirm(&self, question: &str) -> bool {
        match prompt(&format!("{question} (y/n): ")).await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read confirmation");
                false
            }
        }
    }
}

/// Answers yes without asking (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl Operator for AssumeYes {
    async fn confirm(&self, question: &str) -> bool {
        tracing::info!("{question} (assuming yes)");
        true
    }
}

/// Print the registry as a numbered list
pub fn print_nims(registry: &NimRegistry) {
    if registry.is_empty() {
        println!("No NIMs found.");
        return;
    }
    println!("\nAvailable NIMs:");
    for (i, entry) in registry.entries().iter().enumerate() {
        println!("{}. {entry}", i + 1);
    }
}

/// Run the main menu until the operator quits or input ends
///
/// Errors are reported and the menu is shown again.
pub async fn run(app: &App) -> Result<()> {
    loop {
        let has_key = app.api_key().is_ok();
        println!("\nSelect an option:");
        println!("1. Run Manual Test");
        println!(
            "2. Auto Test (Scale until TPS < {})",
            app.config().controller.threshold
        );
        println!("3. {} NGC Key", if has_key { "Change" } else { "Input" });
        println!("4. Manage NIMs");
        println!("5. Quit");

        let Some(choice) = prompt("Enter your choice: ").await? else {
            return Ok(());
        };
        let result = match choice.as_str() {
            "1" => run_tests(app, false).await,
            "2" => run_tests(app, true).await,
            "3" => change_key(app).await,
            "4" => manage_nims(app).await,
            "5" | "q" | "quit" => return Ok(()),
            _ => {
                println!("Invalid option.");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::error!("{e:#}");
            println!("Error: {e:#}");
        }
    }
}

async fn run_tests(app: &App, auto: bool) -> Result<()> {
    if app.api_key().is_err() {
        println!("NGC API key not found. Please input your NGC API key first.");
        return Ok(());
    }
    let registry = app.registry()?;
    if registry.is_empty() {
        println!("No NIMs found. Please add a NIM first.");
        return Ok(());
    }

    print_nims(&registry);
    let choice = ask("Enter the number corresponding to your NIM choice: ").await?;
    let Some(entry) = choice.parse().ok().and_then(|n| registry.get(n)).cloned() else {
        println!("Invalid choice.");
        return Ok(());
    };

    let gpus = ask("What GPUs do you want to use? (e.g., '0', '0,1', 'all'): ").await?;
    let mode = if auto {
        TestMode::Auto
    } else {
        let total =
            ask_number("Enter the total number of requests to send across all rounds: ").await?;
        let concurrency = ask_number(
            "Enter the number of requests to send simultaneously (concurrency level): ",
        )
        .await?;
        TestMode::Manual(LoadLevel::manual(total, concurrency))
    };

    run_selected(app, &entry, &gpus, mode).await
}

async fn run_selected(app: &App, entry: &NimEntry, gpus: &str, mode: TestMode) -> Result<()> {
    let report = app
        .run_test(entry, gpus, mode, Arc::new(StdinOperator))
        .await?;
    if report.stop_reason.is_failure() {
        println!("Test ended early: {}", report.stop_reason);
    }
    Ok(())
}

async fn change_key(app: &App) -> Result<()> {
    let raw = ask("Enter your NGC API key: ").await?;
    let key = app.credentials().save(&raw)?;
    println!("NGC API key has been set and saved ({}).", key.masked());
    Ok(())
}

async fn manage_nims(app: &App) -> Result<()> {
    loop {
        println!("\nNIM Management");
        println!("1. List NIMs");
        println!("2. Add a NIM");
        println!("3. Back to Main Menu");

        let Some(choice) = prompt("Enter your choice: ").await? else {
            return Ok(());
        };
        match choice.as_str() {
            "1" => print_nims(&app.registry()?),
            "2" => {
                let name = ask("Enter the NIM name (e.g., mistral-7b-instruct): ").await?;
                let image = ask(
                    "Enter the Docker image name (e.g., nvcr.io/nim/meta/llama3-8b-instruct:latest): ",
                )
                .await?;
                add_nim(app, &name, &image)?;
            }
            "3" => return Ok(()),
            _ => println!("Invalid option."),
        }
    }
}

/// Register an image and report what happened
pub fn add_nim(app: &App, name: &str, image: &str) -> Result<()> {
    let mut registry = app.registry()?;
    let outcome = registry.add(name, image)?;
    let entry = NimEntry::new(name, image);
    match outcome {
        AddOutcome::Added => println!("NIM {} added.", entry.display_name()),
        AddOutcome::Updated => println!("NIM {} updated.", entry.display_name()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
        assert!(!is_yes("yep"));
    }

    #[tokio::test]
    async fn test_assume_yes_confirms() {
        assert!(AssumeYes.confirm("Stop containers?").await);
    }
}
