#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use callsteer::actor;
use callsteer::config::Config;
use callsteer::entity::{GiftId, SessionId};
use callsteer::media::MediaAccessError;
use callsteer::rng;
use callsteer::session::SessionHandle;
use callsteer::sim::{SimTransport, SyntheticMedia};
use callsteer::sink::JsonLinesSink;

/// Drives one synthetic call end to end and prints the session events as
/// JSON lines. Useful for eyeballing the escalation ladder and gift flow
/// without a real media stack.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file. Falls back to callsteer.toml in the working
    /// directory, then to built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the media and transport simulation. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Hang up after this many seconds.
    #[arg(long, default_value_t = 30)]
    call_secs: u64,

    /// Send this gift during the call; repeatable, spaced evenly.
    #[arg(long = "gift")]
    gifts: Vec<String>,

    /// Script a media acquisition failure instead of connecting.
    #[arg(long, value_enum)]
    fail: Option<FailScript>,

    /// Append call summaries to this file as JSON lines; stdout when omitted.
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailScript {
    NoDevice,
    Permission,
    Busy,
    Constraints,
    Unsupported,
}

impl FailScript {
    fn error(self) -> MediaAccessError {
        match self {
            FailScript::NoDevice => MediaAccessError::DeviceNotFound,
            FailScript::Permission => MediaAccessError::PermissionDenied,
            FailScript::Busy => MediaAccessError::DeviceBusy,
            FailScript::Constraints => MediaAccessError::ConstraintsUnsatisfiable,
            FailScript::Unsupported => MediaAccessError::Unsupported,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callsteer=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(true),
        )
        .init();

    let config = Config::load(args.config.as_deref())?;
    let catalog = config.catalog()?;
    let gifts = args
        .gifts
        .iter()
        .map(|raw| raw.parse().with_context(|| format!("invalid gift id {raw:?}")))
        .collect::<anyhow::Result<Vec<GiftId>>>()?;

    let rng = rng::new_rng(args.seed);
    let mut media = SyntheticMedia::new(rng.clone());
    if let Some(fail) = args.fail {
        media = media.failing_local(fail.error());
    }
    let transport = SimTransport::new(rng, config.transport);

    let writer: Box<dyn Write + Send> = match &args.summary_out {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let sink = JsonLinesSink::new(writer);

    let session_id = SessionId::new();
    let (handle, session, mut events) = SessionHandle::new(
        session_id.clone(),
        media,
        transport,
        sink,
        catalog,
        config.session.clone(),
    );
    tracing::info!(session = %session_id, seed = ?args.seed, "placing synthetic call");

    let mut join_set = JoinSet::new();
    join_set.spawn(actor::run(session));
    join_set.spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!("event serialization failed: {err}"),
            }
        }
    });

    let driver = handle.clone();
    let call_len = Duration::from_secs(args.call_secs);
    join_set.spawn(async move {
        let started = tokio::time::Instant::now();
        let spacing = call_len / (gifts.len() as u32 + 1);
        for gift in gifts {
            tokio::time::sleep(spacing).await;
            match driver.send_gift(gift.clone()).await {
                Ok(receipt) => {
                    tracing::info!(gift = %gift, transaction = %receipt.id, "gift accepted")
                }
                Err(err) => tracing::warn!(gift = %gift, "gift rejected: {err}"),
            }
        }
        tokio::time::sleep(call_len.saturating_sub(started.elapsed())).await;
        driver.end_call().await;
    });

    while join_set.join_next().await.is_some() {}

    let parting = handle.snapshot();
    tracing::info!(
        status = %parting.status,
        duration_secs = parting.duration_secs,
        points_left = parting.point_balance,
        "call over"
    );
    Ok(())
}
