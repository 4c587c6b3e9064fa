use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearhear::audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource, WavCaptureDevice};
use hearhear::session::{LoggingAudioSession, StaticPermissions};
use hearhear::{create_router, AppState, Collaborators, Config, ProcessHost, SessionController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hearhear")]
#[command(about = "Continuous chunked recording with speech detection")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/hearhear")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Ctrl-C or for a fixed time
    Record {
        /// Audio file to replay as the microphone, or "silence"
        #[arg(short, long, default_value = "silence")]
        source: String,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Classify stored chunks and print them, oldest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP control API
    Serve {
        /// Audio file to replay as the microphone, or "silence"
        #[arg(short, long, default_value = "silence")]
        source: String,
    },
}

fn parse_source(source: &str) -> AudioSource {
    if source.eq_ignore_ascii_case("silence") {
        AudioSource::Silence
    } else {
        AudioSource::File(PathBuf::from(shellexpand::tilde(source).as_ref()))
    }
}

/// Wire a recorder to a frame source; without one the device can never start a chunk.
async fn build_recorder(
    cfg: &Config,
    source: Option<AudioSource>,
) -> Result<(SessionController, Option<Box<dyn AudioBackend>>)> {
    let (frames, backend) = match source {
        Some(source) => {
            let backend_config = AudioBackendConfig {
                target_sample_rate: cfg.recorder.sample_rate,
                target_channels: cfg.recorder.channels,
                buffer_duration_ms: 100,
            };
            let mut backend = AudioBackendFactory::create(source, backend_config)?;
            let frames = backend.start().await?;
            info!("Capturing from {}", backend.name());
            (frames, Some(backend))
        }
        None => {
            let (_closed, frames) = mpsc::channel(1);
            (frames, None)
        }
    };

    let parts = Collaborators {
        device: Box::new(WavCaptureDevice::new(frames)),
        permissions: Arc::new(StaticPermissions::new(
            cfg.permissions.microphone,
            cfg.permissions.speech,
        )),
        audio_session: Arc::new(LoggingAudioSession::default()),
        host: Arc::new(ProcessHost::new(
            cfg.lease.max_duration_secs.map(Duration::from_secs),
        )),
        recognizer: None,
        sound_classifier: None,
    };

    let recorder = SessionController::spawn(cfg.session_config(), parts)?;
    Ok((recorder, backend))
}

async fn print_chunks(recorder: &SessionController, json: bool) -> Result<()> {
    let snapshot = recorder
        .wait_until(|s| s.pending_classifications() == 0)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.chunks)?);
        return Ok(());
    }

    for chunk in &snapshot.chunks {
        println!(
            "{:>4}  {}  {:<14}  {}",
            chunk.sequence,
            chunk.created_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", chunk.verdict),
            chunk.location.display()
        );
    }
    println!("{} chunk(s)", snapshot.chunks.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Chunk directory: {}", cfg.chunks_dir().display());

    match args.command {
        Command::Record { source, seconds } => {
            let (recorder, mut backend) = build_recorder(&cfg, Some(parse_source(&source))).await?;

            if let Err(e) = recorder.start().await {
                anyhow::bail!("Could not start recording: {}", e);
            }
            info!("Recording; press Ctrl-C to stop");

            match seconds {
                Some(seconds) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                None => {
                    tokio::signal::ctrl_c()
                        .await
                        .context("Failed to listen for Ctrl-C")?;
                }
            }

            recorder.stop().await;
            if let Some(backend) = backend.as_mut() {
                backend.stop().await?;
            }

            let snapshot = recorder.snapshot();
            if let Some(error) = &snapshot.last_error {
                warn!("Session ended with error: {}", error);
            }
            print_chunks(&recorder, false).await?;
        }

        Command::List { json } => {
            let (recorder, _) = build_recorder(&cfg, None).await?;
            print_chunks(&recorder, json).await?;
        }

        Command::Serve { source } => {
            let (recorder, mut backend) = build_recorder(&cfg, Some(parse_source(&source))).await?;
            let app = create_router(AppState::new(recorder.clone()));

            let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("HTTP server listening on {}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            recorder.stop().await;
            if let Some(backend) = backend.as_mut() {
                backend.stop().await?;
            }
        }
    }

    Ok(())
}
