//! EWS SOAP client binary.
//!
//! Run with: `ews-soap --config client.yaml inbox-rules`
//!
//! Each command negotiates one operation and prints the normalized result as
//! JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ews_soap_client::operations::GetItem;
use ews_soap_client::{CancelToken, ClientConfig, EwsClient};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Exchange Web Services client.
///
/// Negotiates the server version and endpoint automatically:
/// - Tries every configured version, newest first
/// - Tries every endpoint at each version
/// - Routes Autodiscover calls to discovery endpoints only
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "client.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Autodiscover settings for a user
    UserSettings {
        #[arg(long)]
        user: Option<String>,
    },
    /// Resolve a user against the directory
    ResolveNames {
        #[arg(long)]
        user: Option<String>,
    },
    /// Mailboxes visible to eDiscovery
    SearchableMailboxes {
        #[arg(long)]
        filter: Option<String>,
        /// Expand distribution group membership
        #[arg(long)]
        expand: bool,
    },
    /// Inbox rules for a mailbox
    InboxRules {
        #[arg(long)]
        user: Option<String>,
    },
    /// Retrieve one item
    GetItem {
        id: String,
        #[arg(long)]
        change_key: Option<String>,
    },
    /// Delete one or more items
    DeleteItem {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, default_value = "MoveToDeletedItems")]
        delete_type: String,
    },
    /// eDiscovery search across mailboxes
    Search {
        query: String,
        /// Mailbox reference ids from `searchable-mailboxes`
        #[arg(required = true)]
        reference_ids: Vec<String>,
        #[arg(long, default_value = "All")]
        scope: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting EWS SOAP client v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config: ClientConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        ClientConfig::default()
    };

    let cancel = CancelToken::new();
    let client = EwsClient::from_config(config)
        .context("Invalid client configuration")?
        .with_cancel_token(cancel.clone());

    let result = run_until_interrupted(run(&client, args.command), interrupt(), &cancel).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to render result")?
    );
    Ok(())
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupt() {
    if signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drive `task` to completion, cancelling `cancel` when `interrupt` fires.
///
/// The task is not dropped on interrupt: the attempt in flight completes or
/// times out, then the negotiation sees the token and stops.
async fn run_until_interrupted<T>(
    task: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
    cancel: &CancelToken,
) -> T {
    tokio::pin!(task);
    tokio::select! {
        output = &mut task => output,
        _ = interrupt => {
            warn!("Interrupted, stopping after the current attempt");
            cancel.cancel();
            task.await
        }
    }
}

async fn run(client: &EwsClient, command: Command) -> Result<Value> {
    let value = match command {
        Command::UserSettings { user } => client.get_user_settings(user).await?,
        Command::ResolveNames { user } => client.resolve_names(user).await?,
        Command::SearchableMailboxes { filter, expand } => {
            client.get_searchable_mailboxes(filter, expand).await?
        }
        Command::InboxRules { user } => client.get_inbox_rules(user).await?,
        Command::GetItem { id, change_key } => {
            client.get_item(GetItem::new(id, change_key)).await?
        }
        Command::DeleteItem { ids, delete_type } => client.delete_item(ids, &delete_type).await?,
        Command::Search {
            query,
            reference_ids,
            scope,
        } => client.search_mailboxes(&query, reference_ids, &scope).await?,
    };
    Ok(value)
}
