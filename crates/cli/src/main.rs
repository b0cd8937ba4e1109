//! Skin Edit CLI - migrations, catalog seeding and order management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! se-cli migrate
//!
//! # Load or update the catalog from a YAML file
//! se-cli seed data/catalog.yaml
//!
//! # List orders, optionally filtered by name, phone or order id
//! se-cli orders list --search 0912
//!
//! # Change an order's status (rejecting restores stock)
//! se-cli orders status A1B2C3D4 shipped
//! ```
//!
//! # Environment Variables
//!
//! - `ASSISTANT_DATABASE_URL` (falls back to `DATABASE_URL`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "se-cli")]
#[command(author, version, about = "Skin Edit CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Insert or update catalog products from a YAML file
    Seed {
        /// Path to the catalog file
        file: String,
    },
    /// Inspect and manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders, newest first
    List {
        /// Match customer name, phone or order id
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Change an order's status
    Status {
        /// Order id (case-insensitive)
        id: String,
        /// New status (`pending`, `confirmed`, `shipped`, `delivered`, `rejected`)
        status: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::Orders { action } => match action {
            OrdersAction::List { search } => commands::orders::list(search.as_deref()).await?,
            OrdersAction::Status { id, status } => commands::orders::set_status(&id, &status).await?,
        },
    }
    Ok(())
}
