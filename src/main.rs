use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use testdeck::api::auth::{password_digest, ALL_ROLES};
use testdeck::config::Config;
use testdeck::model::{RoleEntry, UserInput};
use testdeck::storage::UserStore;

#[derive(Parser)]
#[command(
    name = "testdeck",
    about = "Self-hosted REST backend for browser UI-test management",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: TESTDECK_CONFIG or
    /// /etc/testdeck/testdeck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address, overrides the config file
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database path, overrides the config file
        #[arg(long)]
        db: Option<String>,
    },

    /// Run database migrations and exit
    Migrate {
        /// SQLite database path, overrides the config file
        #[arg(long)]
        db: Option<String>,
    },

    /// Create a user holding every role (first-user bootstrap)
    SeedAdmin {
        /// Login email
        #[arg(long)]
        email: String,

        /// Initial password
        #[arg(long)]
        password: String,

        /// Display name
        #[arg(long, default_value = "Administrator")]
        name: String,

        /// Organization (tenant) id to place the user in
        #[arg(long, default_value = "1")]
        organization: i64,

        /// SQLite database path, overrides the config file
        #[arg(long)]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind, db } => {
            if let Some(bind) = bind {
                config.server.listen_address = bind;
            }
            if let Some(db) = db {
                config.database.path = db;
            }
            tracing::info!(
                bind = config.server.listen_address.as_str(),
                "starting testdeck server"
            );
            testdeck::serve(config).await?;
        }
        Commands::Migrate { db } => {
            if let Some(db) = db {
                config.database.path = db;
            }
            testdeck::storage::open_pool(&config.database.path)?;
            println!("Migrations applied to {}.", config.database.path);
        }
        Commands::SeedAdmin {
            email,
            password,
            name,
            organization,
            db,
        } => {
            if let Some(db) = db {
                config.database.path = db;
            }
            let pool = testdeck::storage::open_pool(&config.database.path)?;
            let store = UserStore::new(pool);

            let input = UserInput {
                name,
                email: email.clone(),
                password: None,
                roles: ALL_ROLES
                    .iter()
                    .map(|role| RoleEntry {
                        role: role.to_string(),
                    })
                    .collect(),
            };
            let digest = password_digest(&email, &password, &config.auth.password_salt);
            let user = store.create(organization, &input, &digest)?;
            println!("Created admin user {} ({}).", user.email, user.uid);
        }
    }

    Ok(())
}
