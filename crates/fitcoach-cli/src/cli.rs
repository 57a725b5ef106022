//! CLI argument definitions for FitCoach.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// FitCoach -- local secure vault for AI and fitness API credentials.
#[derive(Parser)]
#[command(
    name = "fitcoach",
    version,
    about = "FitCoach -- local secure vault",
    long_about = "Stores third-party API credentials and health data encrypted at rest, \
                  guards outbound API calls, and wipes sensitive data after an idle session."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, env = "FITCOACH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the vault database. Overrides `[storage] path`.
    #[arg(long, global = true, env = "FITCOACH_DB")]
    pub db: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage API credentials.
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },

    /// Manage expiring health records.
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Show the current security posture.
    Posture,

    /// Re-store plaintext credentials from older builds under encryption.
    Migrate,

    /// Remove every credential and sensitive value.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Check a provider's request budget.
    Call {
        /// Provider name (e.g. openai, strava).
        provider: String,

        /// Number of consecutive calls to attempt.
        #[arg(long, short = 'n', default_value_t = 1)]
        count: u32,
    },

    /// Sanitize a JSON request body and print the result.
    Sanitize {
        /// The JSON payload.
        json: String,
    },

    /// Validate a JSON response body.
    CheckResponse {
        /// The JSON response.
        json: String,

        /// Optional JSON shape the response must match.
        #[arg(long)]
        schema: Option<String>,
    },

    /// Run the session monitor until the session expires or Ctrl-C.
    /// Each line typed on stdin counts as activity.
    Watch,
}

/// Actions for managing API credentials.
#[derive(Subcommand)]
pub enum CredentialAction {
    /// Store a credential. An empty value deletes it.
    Set {
        /// Provider name (e.g. openai, anthropic, google, strava).
        provider: String,
        /// The API key or token.
        value: String,
    },
    /// Show a stored credential (masked unless --reveal).
    Get {
        provider: String,
        /// Print the full value.
        #[arg(long)]
        reveal: bool,
    },
    /// Delete a stored credential.
    Delete { provider: String },
    /// List providers with a stored credential.
    List,
    /// Check a credential's format without storing it.
    Validate { provider: String, value: String },
}

/// Actions for managing health records.
#[derive(Subcommand)]
pub enum RecordAction {
    /// Store a JSON value.
    Put {
        key: String,
        /// The JSON payload.
        json: String,
        /// Time to live in seconds (default seven days).
        #[arg(long)]
        ttl_secs: Option<i64>,
    },
    /// Print a stored value.
    Get { key: String },
    /// Delete a stored value.
    Delete { key: String },
    /// List stored record keys.
    List,
    /// Remove expired and corrupted records.
    Sweep,
}
