//! proctor-rt - real-time proctoring session service
//!
//! Startup: tracing, build identification, configuration, database,
//! token secret, composition of the session core, then the HTTP/SSE server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proctor_common::api::{issue_token, load_shared_secret};
use proctor_common::events::{EventBus, Principal, Role};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use proctor_rt::api::{self, AppContext};
use proctor_rt::audit::spawn_audit_logger;
use proctor_rt::config::Config;
use proctor_rt::identity::TokenVerifier;
use proctor_rt::scoring::ScoringPolicy;
use proctor_rt::session::SessionRegistry;
use proctor_rt::store::SqliteStore;
use proctor_rt::ProctorService;

/// Command-line arguments for proctor-rt
#[derive(Parser, Debug)]
#[command(name = "proctor-rt")]
#[command(about = "Real-time proctoring session service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "PROCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "PROCTOR_BIND")]
    bind: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "PROCTOR_DATABASE")]
    database: Option<PathBuf>,

    /// Token signing secret (overrides the value stored in the database)
    #[arg(long, env = "PROCTOR_SHARED_SECRET")]
    shared_secret: Option<i64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bearer token for a principal and exit
    IssueToken {
        /// User id the token names
        #[arg(long)]
        user: Uuid,

        /// candidate, interviewer or admin
        #[arg(long)]
        role: Role,

        /// Lifetime in minutes
        #[arg(long, default_value = "240")]
        ttl_minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proctor_rt=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting proctor-rt v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(args.bind, args.database, args.shared_secret);
    config.validate().context("Invalid configuration")?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = proctor_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let shared_secret = match config.shared_secret {
        Some(secret) => {
            info!("Using shared secret from configuration");
            secret
        }
        None => {
            let secret = load_shared_secret(&pool)
                .await
                .context("Failed to load shared secret")?;
            info!("Loaded shared secret from database");
            secret
        }
    };

    if let Some(Command::IssueToken { user, role, ttl_minutes }) = args.command {
        let expires_at = proctor_common::time::now_millis() + ttl_minutes * 60_000;
        println!("{}", issue_token(&Principal::new(user, role), expires_at, shared_secret));
        return Ok(());
    }

    let policy = ScoringPolicy::from_config(&config.scoring).context("Invalid scoring policy")?;
    let bus = EventBus::new(config.fanout.event_bus_capacity);
    let _audit = spawn_audit_logger(&bus);

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(SqliteStore::new(pool)),
        bus,
        config.registry_timeouts(),
    ));
    let service = Arc::new(ProctorService::new(
        registry,
        Arc::new(TokenVerifier::new(shared_secret)),
        policy,
        config.fanout.outbox_capacity,
    ));

    api::run(AppContext::new(service), &config.bind_addr)
        .await
        .context("Server error")?;

    Ok(())
}
