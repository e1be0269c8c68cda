use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use lumi_recorder::dom::WebDocument;
use lumi_recorder::messaging::{CommandOutcome, PageCommand, PageContext};
use lumi_recorder::model::{proposed_recording_name, Recording};
use lumi_recorder::recorder::EventRecorder;
use lumi_recorder::replayer::{ConsoleEventListener, EventEmitter, Replayer};
use lumi_recorder::store::{JsonFileStore, RecordingStore};
use lumi_recorder::utils::Config;
use lumi_recorder::{report, LocatorGenerator};

#[derive(Parser)]
#[command(name = "lumi-recorder")]
#[command(author = "NL Team")]
#[command(version)]
#[command(about = "Record and replay web page interactions", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a page and record clicks, key presses and scrolls until Ctrl+C
    Record {
        /// Page to open
        #[arg(short, long)]
        url: String,

        /// Recording name (defaults to replayer-<unix seconds>)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replay a saved recording against a page
    Replay {
        /// Recording id (defaults to the selected recording)
        id: Option<String>,

        /// Page to open
        #[arg(short, long)]
        url: String,

        /// Directory for results.json and junit.xml
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List saved recordings
    List,

    /// Print a saved recording as JSON
    Show { id: String },

    /// Mark a recording as selected
    Select { id: String },

    /// Delete a saved recording
    Delete { id: String },

    /// Generate report from saved replay results
    Report {
        /// Path to results.json
        results: PathBuf,

        /// Output format (json, junit)
        #[arg(short, long, default_value = "junit")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let store = Arc::new(JsonFileStore::new(&config.store_path));

    match cli.command {
        Commands::Record { url, name } => {
            println!("{} Starting record mode...", "🔴".to_string().red().bold());
            let document = Arc::new(WebDocument::launch(config.web_config()).await?);
            document.goto(&url).await?;

            let recorder = EventRecorder::new(
                LocatorGenerator::new(config.exclusion_policy()?),
                config.scroll_quiet_window(),
            );
            let replayer = Replayer::new(document.clone(), config.replay_options());
            let mut page = PageContext::new(document.clone(), store.clone(), recorder, replayer);

            page.handle(PageCommand::Start {
                name: name.unwrap_or_else(|| proposed_recording_name(chrono::Local::now())),
            })
            .await?;

            let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
            ctrlc::set_handler(move || {
                println!("\n\n{} Stopping recording...", "⏹️ ".yellow());
                let _ = stop_tx.send(true);
            })?;

            println!("\n🖱️  Recording interactions on {}", url.cyan());
            println!("   Click, type, and scroll in the browser.");
            println!("   Press Ctrl+C when done.\n");

            page.record_until(
                async move {
                    let _ = stop_rx.wait_for(|stop| *stop).await;
                },
                |action| println!("  {} {}", "●".red(), action.describe()),
            )
            .await;

            page.stop_recording().await?;
            let recording = page.save_recording().await?;

            println!("\n{} Recording complete!", "✅".green().bold());
            println!("   Name: {}", recording.name.cyan());
            println!("   Id: {}", recording.id);
            println!("   Actions: {}", recording.count);
        }

        Commands::Replay {
            id,
            url,
            report: report_dir,
        } => {
            let recording = resolve_recording(store.as_ref(), id.as_deref()).await?;

            let document = Arc::new(WebDocument::launch(config.web_config()).await?);
            document.goto(&url).await?;

            let (emitter, receiver) = EventEmitter::new();
            let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

            let replayer =
                Replayer::new(document.clone(), config.replay_options()).with_emitter(emitter);
            let mut page = PageContext::new(
                document.clone(),
                store.clone(),
                EventRecorder::default(),
                replayer,
            );

            let recording_id = recording.id.clone();
            let CommandOutcome::ReplayStarted(handle) =
                page.handle(PageCommand::Replay { recording }).await?
            else {
                anyhow::bail!("Replay did not start");
            };

            let stop = handle.stop_signal();
            ctrlc::set_handler(move || {
                println!("\n\n{} Stopping after the current step...", "⏹️ ".yellow());
                stop.stop();
            })?;

            let run = handle.wait().await?;
            drop(page);
            let _ = listener.await;

            if let Some(dir) = report_dir {
                let results = report::ReplayResults::from_run(&run, Some(&recording_id));
                report::write_reports(&results, &dir).await?;
            }

            if !run.errors.is_empty() {
                println!("\n{} Errors:", "✗".red().bold());
                for error in &run.errors {
                    println!("  [{}] {}", error.index + 1, error.message.red());
                }
            }
        }

        Commands::List => {
            let recordings = store.list().await?;
            let selected = store.get_selected().await?;
            if recordings.is_empty() {
                println!("No recordings saved in {}", store.path().display());
            }
            for recording in recordings {
                let marker = if selected.as_deref() == Some(recording.id.as_str()) {
                    "*".green().bold()
                } else {
                    " ".normal()
                };
                println!(
                    "{} {}  {}  {}  ({} actions)",
                    marker,
                    recording.id.dimmed(),
                    recording.name.cyan(),
                    recording.timestamp,
                    recording.count
                );
            }
        }

        Commands::Show { id } => {
            let recording = resolve_recording(store.as_ref(), Some(&id)).await?;
            println!("{}", serde_json::to_string_pretty(&recording)?);
        }

        Commands::Select { id } => {
            store
                .set_selected(&id)
                .await
                .with_context(|| format!("Failed to select {}", id))?;
            println!("{} Selected {}", "✓".green(), id);
        }

        Commands::Delete { id } => {
            if store.get(&id).await?.is_none() {
                anyhow::bail!("Recording not found: {}", id);
            }
            store.delete(&id).await?;
            println!("{} Deleted {}", "✓".green(), id);
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Recording by id, or the selected one when no id is given
async fn resolve_recording(
    store: &dyn RecordingStore,
    id: Option<&str>,
) -> anyhow::Result<Recording> {
    let id = match id {
        Some(id) => id.to_string(),
        None => store
            .get_selected()
            .await?
            .context("No recording selected; pass an id or run `select` first")?,
    };
    store
        .get(&id)
        .await?
        .with_context(|| format!("Recording not found: {}", id))
}
