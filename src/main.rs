//! workmarket - terminal client for the WorkMarket marketplace
//!
//! Sign in, chat with workers and clients in real time, and follow
//! notifications from the command line.

mod api;
mod auth;
mod chat;
mod config;
mod models;
mod notify;
mod realtime;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{ApiError, WorkFilters};
use crate::chat::ChatError;
use crate::models::Role;

#[derive(Parser)]
#[command(name = "workmarket")]
#[command(about = "Command-line client for the WorkMarket marketplace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account kind: user, worker or admin
        #[arg(long = "as", default_value = "user")]
        role: Role,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// List your chats
    Chats {
        /// Maximum number of chats to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Read messages from a chat
    Read {
        /// Chat ID (from `chats` output)
        chat_id: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Start a conversation with a worker (or, as a worker, with a user)
    StartChat {
        /// The other account's ID
        counterpart: String,
    },

    /// Send a message
    Send {
        /// Chat ID (from `chats` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Join a chat interactively
    Chat {
        /// Chat ID (from `chats` output)
        chat_id: String,

        /// Number of earlier messages to load
        #[arg(long, default_value = "50")]
        history: u32,
    },

    /// List notifications
    Notifications {
        /// Maximum number of notifications to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Mark one notification as read
    MarkRead {
        /// Notification ID (from `notifications` output)
        id: String,
    },

    /// Mark every notification as read
    MarkAllRead,

    /// Follow notifications live
    Watch,

    /// Browse posted works
    Works {
        #[arg(short, long)]
        search: Option<String>,

        /// Work status, or `all`
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,

        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,

        /// Search radius around latitude/longitude, in km
        #[arg(long)]
        max_distance: Option<f64>,
    },

    /// Post a new work
    PostWork {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        category: String,

        #[arg(long)]
        budget: f64,

        #[arg(long)]
        location: Option<String>,

        /// Image file to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Admin: list accounts
    Users {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Admin: block or unblock an account
    BlockUser {
        /// Account ID (from `users` output)
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", user_facing(&e));
        tracing::debug!("{:#}", e);
        std::process::exit(1);
    }
}

/// Server text for API failures, the full chain for everything else.
fn user_facing(e: &anyhow::Error) -> String {
    let api = e.downcast_ref::<ApiError>().or_else(|| match e.downcast_ref::<ChatError>() {
        Some(ChatError::Api(api)) => Some(api),
        _ => None,
    });
    match api {
        Some(api) => api.user_message(),
        None => format!("{:#}", e),
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Login {
            role,
            email,
            password,
        } => {
            tracing::info!("Signing in as {}...", role.as_str());
            auth::login(role, &email, &password).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Chats { limit } => {
            tracing::info!("Fetching chats...");
            api::list_chats(limit).await?;
        }
        Commands::Read { chat_id, limit } => {
            api::read_messages(&chat_id, limit).await?;
        }
        Commands::StartChat { counterpart } => {
            api::start_chat(&counterpart).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            chat::console::send(&to, &message).await?;
        }
        Commands::Chat { chat_id, history } => {
            chat::console::run(&chat_id, history).await?;
        }
        Commands::Notifications { limit } => {
            notify::console::list(limit).await?;
        }
        Commands::MarkRead { id } => {
            notify::console::mark_read(&id).await?;
        }
        Commands::MarkAllRead => {
            notify::console::mark_all_read().await?;
        }
        Commands::Watch => {
            notify::console::watch().await?;
        }
        Commands::Works {
            search,
            status,
            page,
            limit,
            latitude,
            longitude,
            max_distance,
        } => {
            let filters = WorkFilters {
                search,
                status,
                page,
                limit,
                latitude,
                longitude,
                max_distance,
            };
            api::list_works(&filters).await?;
        }
        Commands::PostWork {
            title,
            description,
            category,
            budget,
            location,
            images,
        } => {
            let mut fields = vec![
                ("title".to_string(), title),
                ("description".to_string(), description),
                ("category".to_string(), category),
                ("budget".to_string(), budget.to_string()),
            ];
            if let Some(location) = location {
                fields.push(("location".to_string(), location));
            }
            tracing::info!("Posting work...");
            api::post_work(&fields, &images).await?;
        }
        Commands::Users {
            search,
            page,
            limit,
        } => {
            api::list_users(page, limit, search.as_deref()).await?;
        }
        Commands::BlockUser { id } => {
            api::block_user(&id).await?;
        }
    }

    Ok(())
}
