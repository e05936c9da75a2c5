//! Binary entrypoint for the e-ink frame.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rust_eink_frame::catalog::CatalogCache;
use rust_eink_frame::clock::{Clock, SystemClock};
use rust_eink_frame::commands;
use rust_eink_frame::config::{Configuration, ResumePolicy};
use rust_eink_frame::display::{DisplaySink, SpoolSink};
use rust_eink_frame::error::FrameError;
use rust_eink_frame::logging;
use rust_eink_frame::selector::Selector;
use rust_eink_frame::source::{GooglePhotosSource, PhotoSource};
use rust_eink_frame::state::{self, RotationState};
use rust_eink_frame::tasks::rotation::RotationScheduler;
use rust_eink_frame::token::TokenStore;

/// `test-auth` succeeded but the catalog holds no photos.
const EXIT_NO_PHOTOS: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "eink-frame",
    version,
    about = "Rotate Google Photos pictures on an e-ink panel"
)]
struct Cli {
    /// Path to YAML config file; environment variables override its values.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the rotation loop; blocks until Ctrl-C or SIGTERM.
    Run,
    /// Validate (and refresh if needed) the token, then fetch the catalog once.
    TestAuth,
    /// Print the albums visible to the authorized account.
    ListAlbums,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(try_main(cli)) {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "eink-frame exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn try_main(cli: Cli) -> Result<ExitCode> {
    let cfg = Configuration::load(cli.config.as_deref()).context("loading configuration")?;
    info!(command = ?cli.command, album = cfg.album_id.as_deref(), "starting eink-frame");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let source: Arc<dyn PhotoSource> = Arc::new(GooglePhotosSource::from_config(&cfg)?);
    let tokens = Arc::new(TokenStore::open(
        &cfg.token_file,
        Arc::clone(&source),
        Arc::clone(&clock),
    )?);

    match cli.command {
        Command::Run => run(cfg, source, tokens, clock).await,
        Command::TestAuth => {
            let count = commands::test_auth(&tokens, &*source, cfg.album_id.as_deref()).await?;
            if count == 0 {
                println!("Authorization OK, but no photos were found.");
                return Ok(ExitCode::from(EXIT_NO_PHOTOS));
            }
            println!("Authorization OK: {count} photos available.");
            Ok(ExitCode::SUCCESS)
        }
        Command::ListAlbums => {
            let albums = commands::list_albums(&tokens, &*source).await?;
            if albums.is_empty() {
                println!("No albums found.");
            }
            for album in albums {
                println!("{}\t{} ({} items)", album.id, album.title, album.media_items_count);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(
    cfg: Configuration,
    source: Arc<dyn PhotoSource>,
    tokens: Arc<TokenStore>,
    clock: Arc<dyn Clock>,
) -> Result<ExitCode> {
    let rng = match cfg.shuffle_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let persisted = match cfg.resume {
        ResumePolicy::Resume => load_rotation_state(&cfg),
        ResumePolicy::Reshuffle => None,
    };
    let (selector, last_rotated_at) = match &persisted {
        Some(saved) => {
            info!(
                photos = saved.ordered_ids.len(),
                cursor = saved.cursor,
                last = ?saved.last_rotated_at,
                "resuming rotation from saved state"
            );
            (Selector::from_state(saved, rng), saved.last_rotated_at)
        }
        None => (Selector::new(rng), None),
    };

    let catalog = CatalogCache::new(
        Arc::clone(&source),
        Arc::clone(&tokens),
        Arc::clone(&clock),
        cfg.catalog_ttl,
    )
    .with_album(cfg.album_id.clone());
    let sink: Arc<dyn DisplaySink> =
        Arc::new(SpoolSink::from_config(&cfg.display, Arc::clone(&clock)));

    let mut scheduler = RotationScheduler::new(
        catalog,
        selector,
        tokens,
        source,
        sink,
        clock,
        cfg.rotation_interval(),
    )
    .with_state_file(&cfg.state_file)
    .with_last_rotated_at(last_rotated_at);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match scheduler.run(cancel).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err @ FrameError::AuthRevoked(_)) => {
            error!(error = %err, "authorization revoked; re-authorize the frame and restart");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

fn load_rotation_state(cfg: &Configuration) -> Option<RotationState> {
    match state::read_json_optional::<RotationState>(&cfg.state_file) {
        Ok(saved) => saved,
        Err(err) => {
            warn!(error = ?err, "ignoring unreadable rotation state");
            None
        }
    }
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl-C");
                return;
            }
            info!("ctrl-c received; shutting down");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = term.recv() => {
                        info!("SIGTERM received; shutting down");
                        cancel.cancel();
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    });
}
