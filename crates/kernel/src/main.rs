//! Polyglot
//!
//! HTTP server, periodic backfill runner and maintenance CLI.

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use polyglot_kernel::config::Config;
use polyglot_kernel::content::{ContentKind, ItemRef};
use polyglot_kernel::cron::BackfillResult;
use polyglot_kernel::locale;
use polyglot_kernel::routes;
use polyglot_kernel::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the periodic backfill (default).
    Serve,
    /// Run one backfill pass and exit.
    Backfill {
        /// Only backfill this kind (post, topic, category, tag).
        #[arg(long)]
        kind: Option<ContentKind>,
    },
    /// Translate one post and print the result.
    Translate {
        #[arg(long)]
        post_id: i64,
        /// Target locale, e.g. de or pt_BR.
        #[arg(long)]
        locale: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(config = ?config, "configuration loaded");

    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state, &config).await,
        Command::Backfill { kind } => backfill_once(&state, kind).await,
        Command::Translate { post_id, locale } => translate_once(&state, post_id, &locale).await,
    }
}

async fn serve(state: AppState, config: &Config) -> Result<()> {
    if config.translator_enabled && !config.backfill_interval.is_zero() {
        let runner = state.clone();
        let period = config.backfill_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                run_scheduled(&runner).await;
            }
        });
        info!(interval_secs = period.as_secs(), "periodic backfill scheduled");
    }

    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

async fn run_scheduled(state: &AppState) {
    if let Err(e) = state.backfill().process_event_jobs().await {
        warn!(error = %e, "event job processing failed");
    }
    for (kind, result) in state.backfill().run_all().await {
        if let BackfillResult::Failed(error) = result {
            warn!(kind = %kind, error = %error, "scheduled backfill failed");
        }
    }
}

async fn backfill_once(state: &AppState, kind: Option<ContentKind>) -> Result<()> {
    let results = match kind {
        Some(kind) => vec![(kind, state.backfill().run(kind).await)],
        None => {
            let jobs = state.backfill().process_event_jobs().await?;
            info!(stats = ?jobs, "event jobs processed");
            state.backfill().run_all().await
        }
    };

    let mut failed = false;
    for (kind, result) in results {
        match result {
            BackfillResult::Completed(stats) => info!(kind = %kind, stats = ?stats, "backfill completed"),
            BackfillResult::Skipped => info!(kind = %kind, "backfill already running elsewhere"),
            BackfillResult::Failed(error) => {
                warn!(kind = %kind, error = %error, "backfill failed");
                failed = true;
            }
        }
    }
    if failed {
        bail!("one or more backfills failed");
    }
    Ok(())
}

async fn translate_once(state: &AppState, post_id: i64, raw_locale: &str) -> Result<()> {
    let target = locale::normalize(raw_locale).context("invalid --locale")?;
    let orchestrator = state.orchestrator()?;

    let Some(item) = state.source().get(ItemRef::post(post_id)).await? else {
        bail!("post {post_id} not found");
    };

    let outcome = orchestrator.translate(&item, &target).await?;
    info!(
        post_id,
        source = %outcome.source_locale,
        target = %target,
        origin = ?outcome.origin,
        "translation ready"
    );
    println!("{}", outcome.text);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
