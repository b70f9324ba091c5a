use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, AssistantClient, ClientEvent, DeletionSummary, NoticeLevel};
use shared::domain::{ConversationTurn, FileSource, SelectedFile, SourceRef, Theme};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Manage documents and ask questions about them")]
struct Cli {
    /// Overrides the backend URL from docchat.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the identity provider URL to open in a browser.
    LoginUrl,
    /// Finish a login with the parameters from the OAuth redirect.
    Callback {
        code: String,
        #[arg(long)]
        state: Option<String>,
    },
    Session,
    Logout,
    Documents,
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Toggle {
        name: String,
    },
    /// Delete every inactive document. With --undo the removal is rolled back instead.
    PurgeInactive {
        #[arg(long)]
        undo: bool,
    },
    Ask {
        question: String,
    },
    History,
    ClearChat,
    Theme {
        name: Option<String>,
    },
}

impl Command {
    fn needs_session(&self) -> bool {
        !matches!(self, Command::LoginUrl | Command::Callback { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    info!(api = %settings.api_base_url, "docchat: starting");

    let client = AssistantClient::connect(&settings).await;
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ClientEvent::Notice(notice) = event {
                let tag = match notice.level {
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Info => "info",
                    NoticeLevel::Warning => "warn",
                    NoticeLevel::Error => "error",
                };
                eprintln!("[{tag}] {}", notice.message);
            }
        }
    });

    if cli.command.needs_session() {
        let user = client
            .restore_session()
            .await?
            .ok_or_else(|| anyhow!("not signed in; run `docchat login-url` first"))?;
        info!(user = %user.preferred_username, "docchat: session restored");
    }
    run(&client, cli.command).await?;

    // Let the notice printer drain.
    tokio::task::yield_now().await;
    Ok(())
}

async fn run(client: &Arc<AssistantClient>, command: Command) -> Result<()> {
    match command {
        Command::LoginUrl => {
            println!("{}", client.login_url().await?);
        }
        Command::Callback { code, state } => {
            let user = client.complete_login(&code, state.as_deref()).await?;
            println!("signed in as {}", user.preferred_username);
        }
        Command::Session => {
            if let Some(user) = client.identity().await {
                println!("{}", user.preferred_username);
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("signed out");
        }
        Command::Documents => print_documents(client).await,
        Command::Upload { paths } => {
            let mut files = Vec::with_capacity(paths.len());
            for path in paths {
                files.push(selected_file(path).await?);
            }
            let outcome = client.select_files(files).await?;
            if outcome.accepted.is_empty() {
                bail!("no files were accepted for upload");
            }
            let summary = client.upload_selected().await?;
            for entry in &summary.progress {
                match &entry.error {
                    Some(error) => println!("{:<40} {:?} ({error})", entry.name, entry.status),
                    None => println!("{:<40} {:?}", entry.name, entry.status),
                }
            }
        }
        Command::Toggle { name } => {
            let document = client
                .documents()
                .await
                .into_iter()
                .find(|doc| doc.name == name)
                .ok_or_else(|| anyhow!("no document named '{name}'"))?;
            let toggled = client.toggle_document(document.id).await?;
            println!(
                "{} is now {}",
                toggled.name,
                if toggled.active { "active" } else { "inactive" }
            );
        }
        Command::PurgeInactive { undo } => {
            if client.clear_inactive().await? == 0 {
                return Ok(());
            }
            if undo {
                let restored = client.undo_clear().await?;
                println!("{restored} document(s) restored");
            } else {
                let summary = client.commit_clear().await?;
                for line in deletion_report(&summary) {
                    println!("{line}");
                }
            }
            print_documents(client).await;
        }
        Command::Ask { question } => {
            let turn = client.ask(&question).await?;
            print_turn(&turn);
        }
        Command::History => {
            let history = client.remote_history().await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::ClearChat => {
            client.clear_chat().await?;
        }
        Command::Theme { name } => match name {
            Some(name) => {
                let theme: Theme = name.parse()?;
                client.set_theme(theme).await;
                println!("theme set to {theme}");
            }
            None => {
                let current = client.theme().await;
                for theme in Theme::ALL {
                    let marker = if theme == current { "*" } else { " " };
                    println!("{marker} {theme}");
                }
            }
        },
    }
    Ok(())
}

async fn selected_file(path: PathBuf) -> Result<SelectedFile> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
        .to_string();
    Ok(SelectedFile {
        name,
        size_bytes: metadata.len(),
        source: FileSource::Path(path),
    })
}

fn deletion_report(summary: &DeletionSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .failed
        .iter()
        .map(|(name, error)| format!("{name:<40} not deleted ({error})"))
        .collect();
    lines.extend(summary.message());
    lines
}

async fn print_documents(client: &AssistantClient) {
    let documents = client.documents().await;
    if documents.is_empty() {
        println!("no documents");
    }
    for document in documents {
        let state = if document.active { "active" } else { "inactive" };
        println!("{:<8} {}", state, document.name);
    }
}

fn print_turn(turn: &ConversationTurn) {
    if let Some(short) = &turn.short_answer {
        println!("{short}");
        println!();
    }
    println!("{}", turn.answer.as_deref().unwrap_or_default());
    let sources = turn.display_sources();
    if !sources.is_empty() {
        println!();
        println!("sources:");
        for source in sources {
            match source {
                SourceRef::Structured {
                    source,
                    page,
                    section,
                } => {
                    let page = match page {
                        Value::String(page) => page.clone(),
                        other => other.to_string(),
                    };
                    match section {
                        Some(section) => println!("  {source} p.{page} ({section})"),
                        None => println!("  {source} p.{page}"),
                    }
                }
                SourceRef::Plain(source) => println!("  {source}"),
            }
        }
    }
    if let Some(label) = turn.response_time_label() {
        println!("({label})");
    }
}
