//! herald - command line front end for the scheduled publication engine.
//!
//! Every subcommand is one short invocation: the engine keeps no state in
//! memory between runs, so cron (or any scheduler) drives it by calling
//! `herald sweep` and `herald tick`.

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use herald_core::app::{Page, Session};
use herald_core::config::HeraldConfig;
use herald_core::domain::{ItemId, JobState, OwnerId};
use herald_core::impls::{HttpPublishApi, ScriptedPublishApi, SqliteDatabase, StaticCredentials};
use herald_core::ports::Credentials;
use herald_core::PublicationEngine;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Scheduled publication engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./herald.toml; HERALD_* env vars override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema
    Init,
    /// Create a draft item
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        content: String,
    },
    /// Schedule (or reschedule) an item
    Schedule {
        item: ItemId,
        /// RFC 3339 fire time
        #[arg(long, conflicts_with = "in_secs")]
        at: Option<DateTime<Utc>>,
        /// Fire this many seconds from now
        #[arg(long)]
        in_secs: Option<i64>,
    },
    /// Move a scheduled item back to draft
    Withdraw { item: ItemId },
    /// Show an item and its activity
    Show { item: ItemId },
    /// Publish one of the owner's items immediately
    PublishNow {
        item: ItemId,
        #[arg(long)]
        owner: String,
    },
    /// Delay-queue sweep (run every minute)
    Sweep {
        #[arg(long, env = "HERALD_TRIGGER_SECRET")]
        secret: Option<String>,
    },
    /// Periodic fallback scan plus reconciliation
    Tick {
        #[arg(long, env = "HERALD_TRIGGER_SECRET")]
        secret: Option<String>,
    },
    /// Check one owner's due items
    Check {
        #[arg(long)]
        owner: String,
    },
    /// Queue statistics
    Stats {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
    },
    /// List jobs in a state
    Jobs {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
        #[arg(long, default_value = "waiting")]
        state: JobState,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Recent activity across all items
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Stop queue sweeps from claiming work
    Pause {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
    },
    /// Resume queue sweeps
    Resume {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
    },
    /// Delete finished jobs older than the retention window
    Purge {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
        /// Override sweep.job_retention_secs
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
    /// Drop every job (refused in production)
    Reset {
        #[arg(long, env = "HERALD_OPERATOR_TOKEN")]
        token: Option<String>,
    },
    /// Run a self-contained scenario against an in-memory engine
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Demo = cli.command {
        return demo::run().await;
    }

    let config = HeraldConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Commands::Init = cli.command {
        SqliteDatabase::open(&config.database.path)
            .with_context(|| format!("opening {}", config.database.path.display()))?;
        info!(path = %config.database.path.display(), "database ready");
        return Ok(());
    }

    let engine = build_engine(&config)?;
    match cli.command {
        Commands::Init | Commands::Demo => {}
        Commands::Create { owner, content } => {
            print_json(&engine.create_draft(OwnerId::new(owner), content).await?)?;
        }
        Commands::Schedule { item, at, in_secs } => {
            let at = match (at, in_secs) {
                (Some(at), _) => at,
                (None, Some(secs)) => Utc::now() + chrono::Duration::seconds(secs),
                (None, None) => anyhow::bail!("either --at or --in-secs is required"),
            };
            let job_id = engine.schedule_item(item, at).await?;
            print_json(&serde_json::json!({ "item_id": item, "job_id": job_id, "fire_at": at }))?;
        }
        Commands::Withdraw { item } => {
            let removed = engine.withdraw_item(item).await?;
            print_json(&serde_json::json!({ "item_id": item, "jobs_removed": removed }))?;
        }
        Commands::Show { item } => {
            let activity = engine.activity_for(item).await?;
            print_json(&serde_json::json!({
                "item": engine.item(item).await?,
                "activity": activity,
            }))?;
        }
        Commands::PublishNow { item, owner } => {
            let session = Session::new(OwnerId::new(owner));
            print_json(&engine.triggers().publish_now(&session, item).await?)?;
        }
        Commands::Sweep { secret } => {
            let secret = trigger_secret(secret, &config);
            print_json(&engine.triggers().queue_sweep(&secret).await?)?;
        }
        Commands::Tick { secret } => {
            let secret = trigger_secret(secret, &config);
            print_json(&engine.triggers().periodic(&secret).await?)?;
        }
        Commands::Check { owner } => {
            let session = Session::new(OwnerId::new(owner));
            print_json(&engine.triggers().client_check(&session).await?)?;
        }
        Commands::Stats { token } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            print_json(&introspection.stats(&operator).await?)?;
        }
        Commands::Jobs {
            token,
            state,
            page,
            size,
        } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            let jobs = introspection
                .list_jobs(&operator, state, Page::new(page, size))
                .await?;
            print_json(&jobs)?;
        }
        Commands::Activity { limit } => {
            print_json(&engine.recent_activity(limit).await?)?;
        }
        Commands::Pause { token } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            introspection.pause(&operator).await?;
            print_json(&introspection.stats(&operator).await?)?;
        }
        Commands::Resume { token } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            introspection.resume(&operator).await?;
            print_json(&introspection.stats(&operator).await?)?;
        }
        Commands::Purge {
            token,
            older_than_secs,
        } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            let retention = older_than_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.job_retention());
            let removed = introspection.purge(&operator, retention).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Commands::Reset { token } => {
            let introspection = engine.introspection();
            let operator = introspection.authorize(&operator_token(token, &config))?;
            let removed = introspection.reset(&operator).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
    }
    Ok(())
}

fn build_engine(config: &HeraldConfig) -> Result<PublicationEngine> {
    let db = SqliteDatabase::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;

    let builder = PublicationEngine::builder()
        .items(db.item_store())
        .queue(db.delay_queue())
        .activity(db.activity_log())
        .settings(config.engine_settings());

    let builder = match config.publish.endpoint.as_deref() {
        Some(endpoint) => {
            let credentials = match config.publish.access_token.as_deref() {
                Some(token) => StaticCredentials::shared(Credentials::new(token)),
                None => StaticCredentials::new(),
            };
            builder
                .publish_api(HttpPublishApi::new(endpoint, config.request_timeout())?)
                .credentials(credentials)
        }
        None => {
            info!("no publish endpoint configured; using the offline publisher");
            builder
                .publish_api(ScriptedPublishApi::new())
                .credentials(StaticCredentials::shared(Credentials::new("offline")))
        }
    };
    Ok(builder.build()?)
}

/// The CLI runs on the trusted side, so it falls back to the configured
/// secret when none is passed.
fn trigger_secret(arg: Option<String>, config: &HeraldConfig) -> String {
    arg.or_else(|| config.triggers.secret.clone())
        .unwrap_or_default()
}

fn operator_token(arg: Option<String>, config: &HeraldConfig) -> String {
    arg.or_else(|| config.operators.token.clone())
        .unwrap_or_default()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
