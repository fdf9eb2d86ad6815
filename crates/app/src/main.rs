mod actions;
mod config;
mod server;

use actions::{ActionResult, Services};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docuchat", version, about = "Ask questions about your documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Store a file in the document directory and index it.
    Ingest {
        /// File to upload.
        #[arg(long)]
        file: PathBuf,
        /// Media type recorded on every chunk; inferred from the extension when omitted.
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Rebuild the collection from every stored document.
    Reindex,
    /// Answer a question from the indexed documents.
    Ask {
        #[arg(long)]
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    let services = Arc::new(Services::from_settings(&cli.settings)?);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = ?cli.settings.vector_backend,
        collection = %cli.settings.collection,
        "docuchat boot"
    );

    match cli.command {
        Command::Serve => {
            server::run_server(services, cli.settings.bind, cli.settings.max_upload_bytes).await?;
        }
        Command::Ingest { file, mime_type } => {
            let bytes = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            let result =
                actions::upload_document(&services, file_name, mime_type.as_deref(), &bytes).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let ActionResult::Err(error) = result {
                anyhow::bail!(error.message);
            }
        }
        Command::Reindex => {
            let result = actions::reindex(&services).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let ActionResult::Err(error) = result {
                anyhow::bail!(error.message);
            }
        }
        Command::Ask { question } => {
            let answer = actions::chat(&services, &question)
                .await
                .map_err(|error| anyhow::anyhow!(error.message))?;

            println!("{}", answer.answer);
            for (index, source) in answer.sources.iter().enumerate() {
                let page = source
                    .metadata
                    .page
                    .map(|page| format!(" page={page}"))
                    .unwrap_or_default();
                println!("[{}] {}{}", index + 1, source.metadata.source, page);
                println!("  {}", source.content);
            }
        }
    }

    Ok(())
}
