//! # Campus - Operator CLI
//!
//! The binary for a locally persisted campus services store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │             apps/campus (THE BINARY)          │
//! │                                               │
//! │   ┌──────────────┐      ┌──────────────────┐  │
//! │   │     CLI      │      │   Maintenance    │  │
//! │   │   (clap)     │      │  (tokio timer)   │  │
//! │   └──────┬───────┘      └────────┬─────────┘  │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │  campus-core  │                │
//! │              │  (THE LOGIC)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! CAMPUS_ADMIN_PASSWORD=... campus init --admin root
//! campus status
//! CAMPUS_ADMIN_PASSWORD=... campus --admin root backup create
//! campus maintain --interval 600
//! ```

use campus::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CAMPUS_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("CAMPUS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campus=info,campus_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        println!("campus v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
