//! CLI entry point for FitCoach.
//!
//! This binary provides the `fitcoach` command for managing the local secure
//! vault: credentials, health records, posture, API guard checks, and the
//! idle-session monitor.

mod app;
mod cli;
mod config;
mod helpers;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use fitcoach_session::{ActivityKind, SessionEvent, SessionMonitor, TimerScheduler, VaultWipe};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::App;
use crate::cli::{Cli, Commands, CredentialAction, RecordAction};
use crate::config::Config;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` is optional and may supply FITCOACH_CONFIG / FITCOACH_DB.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Watch => "info",
        _ => "warn",
    };
    helpers::init_tracing(default_level, cli.json);

    let config = Config::load(cli.config.as_deref())?;
    let app = App::open(config, cli.db)?;

    match cli.command {
        Commands::Credential { action } => cmd_credential(&app, action).await,
        Commands::Record { action } => cmd_record(&app, action).await,
        Commands::Posture => cmd_posture(&app).await,
        Commands::Migrate => cmd_migrate(&app).await,
        Commands::Clear { yes } => cmd_clear(&app, yes).await,
        Commands::Call { provider, count } => cmd_call(&app, &provider, count).await,
        Commands::Sanitize { json } => cmd_sanitize(&app, &json),
        Commands::CheckResponse { json, schema } => {
            cmd_check_response(&json, schema.as_deref())
        }
        Commands::Watch => cmd_watch(&app).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: credential
// ---------------------------------------------------------------------------

async fn cmd_credential(app: &App, action: CredentialAction) -> Result<()> {
    match action {
        CredentialAction::Set { provider, value } => {
            app.store
                .set_credential(&provider, &value)
                .await
                .with_context(|| format!("failed to store credential for {provider}"))?;
            if value.trim().is_empty() {
                println!("Deleted credential for {provider}.");
            } else {
                println!("Stored credential for {provider}.");
            }
        }
        CredentialAction::Get { provider, reveal } => {
            match app.store.get_credential(&provider).await {
                Some(secret) if reveal => println!("{secret}"),
                Some(secret) => println!("{provider}: {}", helpers::mask_secret(&secret)),
                None => println!("{provider}: not configured"),
            }
        }
        CredentialAction::Delete { provider } => {
            app.store
                .delete_credential(&provider)
                .await
                .with_context(|| format!("failed to delete credential for {provider}"))?;
            println!("Deleted credential for {provider}.");
        }
        CredentialAction::List => {
            let providers = app.store.list_providers().await;
            if providers.is_empty() {
                println!("No credentials stored.");
            }
            for provider in providers {
                let state = if app.store.has_credential(&provider).await {
                    "configured"
                } else {
                    "unreadable"
                };
                println!("  {provider:<12} {state}");
            }
        }
        CredentialAction::Validate { provider, value } => {
            app.guard
                .check_credential(&provider, value.trim())
                .map_err(|e| anyhow!("invalid {provider} credential: {e}"))?;
            println!("Credential format looks valid for {provider}.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: record
// ---------------------------------------------------------------------------

async fn cmd_record(app: &App, action: RecordAction) -> Result<()> {
    match action {
        RecordAction::Put {
            key,
            json,
            ttl_secs,
        } => {
            let payload = helpers::parse_json("record payload", &json)?;
            let ttl = ttl_secs.map(helpers::ttl_from_secs).transpose()?;
            app.health
                .store(&key, &payload, ttl)
                .await
                .with_context(|| format!("failed to store record {key}"))?;
            println!("Stored record {key}.");
        }
        RecordAction::Get { key } => match app.health.retrieve_value(&key).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("{key}: not found"),
        },
        RecordAction::Delete { key } => {
            app.health
                .remove(&key)
                .await
                .with_context(|| format!("failed to delete record {key}"))?;
            println!("Deleted record {key}.");
        }
        RecordAction::List => {
            let keys = app.health.keys().await;
            if keys.is_empty() {
                println!("No records stored.");
            }
            for key in keys {
                println!("  {key}");
            }
        }
        RecordAction::Sweep => {
            let removed = app.health.sweep().await;
            println!("Removed {removed} record(s). {}", app.health.stats());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: posture, migrate, clear
// ---------------------------------------------------------------------------

async fn cmd_posture(app: &App) -> Result<()> {
    let posture = app.posture.recheck().await;

    println!("Vault:    {}", app.db_path.display());
    println!("Level:    {}", posture.level);
    println!(
        "Self-test: {}",
        if posture.encryption_self_test { "passed" } else { "FAILED" }
    );
    if posture.vulnerabilities.is_empty() {
        println!("No vulnerabilities found.");
    }
    for vulnerability in &posture.vulnerabilities {
        println!("  - {vulnerability}");
    }
    if !posture.legacy_plaintext_credentials.is_empty() {
        println!("Run `fitcoach migrate` to encrypt legacy credentials.");
    }
    Ok(())
}

async fn cmd_migrate(app: &App) -> Result<()> {
    let migrated = app
        .store
        .migrate_legacy_credentials()
        .await
        .context("failed to migrate legacy credentials")?;
    app.posture.discard();
    println!("Migrated {migrated} legacy credential(s).");
    Ok(())
}

async fn cmd_clear(app: &App, yes: bool) -> Result<()> {
    if !yes && !helpers::confirm("Remove every stored credential and record?")? {
        println!("Aborted.");
        return Ok(());
    }
    let removed = app.store.clear_all().await.context("failed to clear vault")?;
    app.posture.discard();
    println!("Removed {removed} entr{}.", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: call, sanitize, check-response
// ---------------------------------------------------------------------------

async fn cmd_call(app: &App, provider: &str, count: u32) -> Result<()> {
    if !app.store.has_credential(provider).await {
        warn!(provider = provider, "no credential configured");
    }
    match app.guard.policy(provider) {
        Some(policy) => println!(
            "{provider}: {} request(s) per {}s",
            policy.max_requests, policy.window_secs
        ),
        None => println!("{provider}: no rate limit"),
    }

    let mut admitted = 0;
    for attempt in 1..=count {
        let allowed = app.guard.can_call(provider);
        if allowed {
            admitted += 1;
        }
        println!(
            "  call {attempt}: {}",
            if allowed { "allowed" } else { "rate limited" }
        );
    }
    println!("{admitted}/{count} admitted.");
    Ok(())
}

fn cmd_sanitize(app: &App, raw: &str) -> Result<()> {
    let payload = helpers::parse_json("payload", raw)?;
    println!("{}", app.guard.sanitize_request(&payload));
    Ok(())
}

fn cmd_check_response(raw: &str, schema: Option<&str>) -> Result<()> {
    let response = helpers::parse_json("response", raw)?;
    let schema = schema
        .map(|s| helpers::parse_json("schema", s))
        .transpose()?;

    fitcoach_guard::check_response(&response, schema.as_ref())
        .map_err(|reason| anyhow!("response rejected: {reason}"))?;
    println!("Response accepted.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: watch
// ---------------------------------------------------------------------------

async fn cmd_watch(app: &App) -> Result<()> {
    let settings = &app.config.session;
    let monitor = Arc::new(SessionMonitor::new(
        settings.monitor_config(),
        Arc::new(VaultWipe::new(app.store.clone(), app.health.clone())),
    ));
    let mut events = monitor.subscribe();

    let scheduler = TimerScheduler::new();
    monitor.start(&scheduler)?;

    let posture = app.posture.clone();
    scheduler.schedule_repeating("posture-recheck", settings.posture_recheck(), move || {
        let posture = Arc::clone(&posture);
        async move {
            posture.recheck().await;
        }
    })?;

    let initial = app.posture.current().await;
    info!(
        level = %initial.level,
        warn_after_secs = settings.warn_after_secs,
        expire_after_secs = settings.expire_after_secs,
        "session monitor running"
    );
    println!("Watching session. Press Enter to register activity, Ctrl-C to stop.");

    let activity = Arc::clone(&monitor);
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            activity.record_activity(ActivityKind::Key);
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Warning { remaining }) => {
                    println!("Session idle: expires in {}s without activity.", remaining.as_secs());
                }
                Ok(SessionEvent::Resumed) => println!("Activity detected, session resumed."),
                Ok(SessionEvent::Expired) => {
                    println!("Session expired. Sensitive data has been wiped.");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "session events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    stdin_task.abort();
    scheduler.shutdown();
    app.posture.discard();
    Ok(())
}
