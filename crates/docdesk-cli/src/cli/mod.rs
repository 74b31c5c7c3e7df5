//! CLI entry and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docdesk_core::api::Dispatcher;
use docdesk_core::config;
use docdesk_core::credentials::CredentialStore;
use docdesk_core::logging;
use docdesk_core::session::SessionManager;
use docdesk_core::storage::FileStorage;

mod commands;

#[derive(Parser)]
#[command(name = "docdesk")]
#[command(version)]
#[command(about = "Documents and AI chat from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with your user code
    Login {
        /// User code
        #[arg(short, long)]
        username: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long, env = "DOCDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out and forget the stored session
    Logout,

    /// Show who is logged in
    Status,

    /// List, inspect and manage documents
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },

    /// Ask questions about your documents
    Chat {
        /// Ask a single question and exit
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum DocsCommands {
    /// Lists documents, optionally filtered
    List {
        /// Search text
        #[arg(short, long, default_value = "")]
        query: String,

        /// Page number (10 documents per page)
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Shows one document
    Show {
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,
    },
    /// Uploads a file (pdf, txt, docx, csv, xlsx, xls)
    Upload {
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,

        /// Uploader name (defaults to your full name)
        #[arg(long)]
        uploaded_by: Option<String>,
    },
    /// Renames a document; the extension is dropped
    Rename {
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Deletes a document
    Delete {
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Config commands must work even when the config itself is broken.
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let _log_guard = logging::init();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

/// Builds the session for this invocation; each run is a fresh "page load".
fn open_session() -> Result<SessionManager> {
    let config = config::Config::load().context("load config")?;
    let routes = config.routes()?;
    let storage = Arc::new(FileStorage::open_default());
    let dispatcher = Dispatcher::new(routes, CredentialStore::new(storage));
    let session = SessionManager::new(dispatcher, config.token_ttl());
    let status = session.restore();
    tracing::debug!(status = status.label(), "session restored");
    Ok(session)
}

async fn dispatch(cli: Cli) -> Result<()> {
    let session = open_session()?;

    match cli.command {
        Commands::Login { username, password } => {
            commands::auth::login(&session, &username, password).await
        }
        Commands::Logout => {
            commands::auth::logout(&session);
            Ok(())
        }
        Commands::Status => {
            commands::auth::status(&session);
            Ok(())
        }

        Commands::Docs { command } => match command {
            DocsCommands::List { query, page } => {
                commands::docs::list(&session, &query, page).await
            }
            DocsCommands::Show { id } => commands::docs::show(&session, &id).await,
            DocsCommands::Upload { file, uploaded_by } => {
                commands::docs::upload(&session, &file, uploaded_by).await
            }
            DocsCommands::Rename { id, name } => {
                commands::docs::rename(&session, &id, &name).await
            }
            DocsCommands::Delete { id } => commands::docs::delete(&session, &id).await,
        },

        Commands::Chat { prompt } => commands::chat::run(&session, prompt.as_deref()).await,

        Commands::Config { .. } => Ok(()),
    }
}
