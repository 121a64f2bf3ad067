//! # Campus CLI Module
//!
//! Operator commands for a campus store.
//!
//! ## Available Commands
//!
//! - `init` - Create the database, optionally with a first admin
//! - `status` - Schema version and per-collection counts
//! - `user-add` - Register an account
//! - `stats` - System statistics (admin)
//! - `export` / `import` - JSON snapshot to and from a file (admin)
//! - `backup` - Backup registry: create, list, restore, delete, hash (admin)
//! - `sweep` - Run one maintenance pass
//! - `maintain` - Run maintenance on a fixed interval until Ctrl-C
//!
//! Admin commands sign in as `--admin <username>` with the password taken
//! from `CAMPUS_ADMIN_PASSWORD`.

mod commands;

use crate::config::{AppConfig, DB_ENV};
use campus_core::{CampusError, CampusResult, Role};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

/// Environment variable holding the admin password.
pub const ADMIN_PASSWORD_ENV: &str = "CAMPUS_ADMIN_PASSWORD";

/// Environment variable holding the password for `user-add`.
pub const NEW_PASSWORD_ENV: &str = "CAMPUS_NEW_PASSWORD";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Campus services store: operator CLI.
#[derive(Parser, Debug)]
#[command(name = "campus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database (overrides CAMPUS_DB and the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Admin username for privileged commands
    #[arg(long, global = true)]
    pub admin: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new database
    Init {
        /// Replace an existing database file
        #[arg(short, long)]
        force: bool,

        /// Email for the first admin (with --admin)
        #[arg(long)]
        admin_email: Option<String>,
    },

    /// Show schema version and record counts
    Status,

    /// Register an account (password from CAMPUS_NEW_PASSWORD)
    UserAdd {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// student, faculty, admin, mess-staff, placement-officer
        #[arg(short, long, default_value = "student")]
        role: Role,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Show system statistics
    Stats,

    /// Export every collection to a JSON snapshot (credentials stripped)
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import a JSON snapshot
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage the backup registry
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Run one maintenance pass
    Sweep,

    /// Run maintenance on a fixed interval until Ctrl-C
    Maintain {
        /// Seconds between passes (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

/// Backup registry actions.
#[derive(Subcommand, Debug)]
pub enum BackupAction {
    /// Store a backup of the current state
    Create,
    /// List backups, newest first
    List,
    /// Restore a backup by id
    Restore { id: String },
    /// Delete a backup by id
    Delete { id: String },
    /// BLAKE3 digest of a stored backup
    Hash { id: String },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> CampusResult<()> {
    let app = AppConfig::load(cli.config.as_deref())?;
    let ctx = CommandContext {
        database: app.database_path(cli.database.clone(), std::env::var(DB_ENV).ok()),
        config: app.campus,
        json_mode: cli.json_mode,
    };
    if cli.verbose {
        tracing::info!(event = "cli_start", database = %ctx.database.display());
    }
    let admin = || {
        AdminCredentials::from_parts(cli.admin.clone(), std::env::var(ADMIN_PASSWORD_ENV).ok())
    };

    match cli.command {
        Some(Commands::Init { force, admin_email }) => {
            let bootstrap = match &cli.admin {
                Some(_) => Some(admin()?),
                None => None,
            };
            cmd_init(&ctx, force, bootstrap.as_ref(), admin_email)
        }
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::UserAdd {
            username,
            email,
            role,
            department,
            name,
        }) => {
            let password = std::env::var(NEW_PASSWORD_ENV).map_err(|_| {
                CampusError::Validation(format!("{} must hold the new password", NEW_PASSWORD_ENV))
            })?;
            cmd_user_add(
                &ctx,
                NewAccount {
                    username,
                    email,
                    password,
                    role,
                    department,
                    name,
                },
            )
        }
        Some(Commands::Stats) => cmd_stats(&ctx, &admin()?),
        Some(Commands::Export { output }) => cmd_export(&ctx, &admin()?, &output),
        Some(Commands::Import { input }) => cmd_import(&ctx, &admin()?, &input),
        Some(Commands::Backup { action }) => cmd_backup(&ctx, &admin()?, action),
        Some(Commands::Sweep) => cmd_sweep(&ctx),
        Some(Commands::Maintain { interval }) => cmd_maintain(&ctx, interval).await,
    }
}
