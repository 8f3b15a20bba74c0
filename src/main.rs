#![forbid(unsafe_code)]

//! `simbridge`: drive a simulator from the command line.
//!
//! Loads configuration, brings the simulation environment up inside a
//! scoped block, runs one subcommand, and always tears the environment
//! down before exiting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::FutureExt;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use simbridge::{AppError, GlobalConfig, Result, SimEnvironment};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "simbridge", about = "Simulator process, control and streaming bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the simulator host.
    #[arg(long)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize the environment and print its composite status as JSON.
    Status,
    /// Stream frames and audio for a while and report how many arrived.
    Stream {
        /// How long to stream before stopping.
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Scene to load before streaming starts.
        #[arg(long)]
        scene: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("simbridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    info!(host = config.host, "configuration loaded");

    let mut env = SimEnvironment::new(config);
    match args.command {
        Command::Status => env.scoped(|env| print_status(env).boxed()).await,
        Command::Stream { seconds, scene } => {
            let duration = Duration::from_secs(seconds);
            env.scoped(move |env| stream_for(env, duration, scene).boxed())
                .await
        }
    }
}

async fn print_status(env: &mut SimEnvironment) -> Result<()> {
    let status = env.status().await;
    let rendered = serde_json::to_string_pretty(&status)
        .map_err(|err| AppError::Config(format!("failed to render status: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn stream_for(
    env: &mut SimEnvironment,
    duration: Duration,
    scene: Option<String>,
) -> Result<()> {
    if !env.is_initialized() {
        return Err(AppError::Process(
            "simulation environment failed to initialize".into(),
        ));
    }

    if let Some(scene) = scene {
        if !env.load_scene(&scene).await {
            warn!(scene, "scene load failed; streaming the current scene");
        }
    }

    let frames = Arc::new(AtomicU64::new(0));
    let audio = Arc::new(AtomicU64::new(0));
    let frame_counter = Arc::clone(&frames);
    env.set_frame_callback(move |_| {
        frame_counter.fetch_add(1, Ordering::Relaxed);
        std::future::ready(())
    });
    let audio_counter = Arc::clone(&audio);
    env.set_audio_callback(move |_| {
        audio_counter.fetch_add(1, Ordering::Relaxed);
        std::future::ready(())
    });

    if !env.start_streaming().await {
        return Err(AppError::Streaming("failed to start streaming".into()));
    }
    info!(stream_url = env.streaming().stream_url(), "streaming started");

    tokio::select! {
        () = tokio::time::sleep(duration) => info!("stream duration elapsed"),
        () = shutdown_signal() => info!("shutdown signal received"),
    }

    env.stop_streaming().await;
    info!(
        frames = frames.load(Ordering::Relaxed),
        audio_chunks = audio.load(Ordering::Relaxed),
        "streaming finished"
    );
    if !env.streaming().is_connected() {
        error!("streaming connection dropped before the run finished");
    }
    Ok(())
}

/// Wait for SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
