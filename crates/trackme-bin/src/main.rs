//! trackme command-line tool
//!
//! - `record`: stream sensor events to the configured file and network sinks
//! - `listen`: receive a remote session over TCP and record it to a file
//! - `dump`: print a binary recording in text form
//! - `convert`: turn a text recording back into the binary record stream
//!
//! # Usage
//!
//! ```bash
//! trackme record --config config/trackme.toml --duration 30s
//! trackme listen --bind 0.0.0.0:50000 --output received
//! trackme dump recordings/1700000000000.sns
//! trackme convert walk.txt walk.sns
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use trackme::{
    telemetry, LogFormat, ProducerKind, RecordingController, ReplayConfig, TrackmeConfig,
};
use trackme_core::{decode_all, Event};
use trackme_drivers::Pacing;
use trackme_storage::{
    FileSpec, NetworkSpec, SessionRecorder, StreamListener, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_LISTEN_PORT,
};

#[derive(Parser)]
#[command(name = "trackme")]
#[command(about = "Motion-sensor event streaming to file and network sinks", long_about = None)]
struct Cli {
    /// Configuration file (TOML); missing files fall back to defaults
    #[arg(long, global = true, default_value = trackme::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[logging] level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override `[logging] format` (pretty, compact, json)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from the configured producer
    Record(RecordArgs),
    /// Accept remote sessions and record each to a file
    Listen {
        /// Address to listen on
        #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_LISTEN_PORT}"))]
        bind: String,
        /// Directory for received recordings (default: `[output.file] directory`)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Fixed file name instead of `<unix-millis>.sns`
        #[arg(long)]
        name: Option<String>,
        /// Number of sessions to record before exiting
        #[arg(long, default_value_t = 1)]
        sessions: u32,
    },
    /// Print every record of a binary recording in text form
    Dump {
        /// Recording to read
        file: PathBuf,
    },
    /// Convert a text recording into a binary record stream
    Convert {
        /// Text input, one tab-separated record per line
        input: PathBuf,
        /// Binary output file (overwritten)
        output: PathBuf,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Record into this directory
    #[arg(long)]
    output: Option<PathBuf>,
    /// Recording file name
    #[arg(long)]
    name: Option<String>,
    /// Do not write a local file
    #[arg(long, conflicts_with_all = ["output", "name"])]
    no_file: bool,
    /// Also stream to `HOST:PORT`
    #[arg(long, value_name = "HOST:PORT", value_parser = parse_endpoint)]
    network: Option<(String, u16)>,
    /// Replay this recording instead of the configured producer
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Replay as fast as possible instead of in real time
    #[arg(long, requires = "replay")]
    fast: bool,
    /// Stop after this many generated samples
    #[arg(long)]
    samples: Option<u64>,
    /// Generator seed
    #[arg(long)]
    seed: Option<u64>,
    /// Stop after this long (e.g. `30s`, `2m`)
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    duration: Option<Duration>,
}

impl RecordArgs {
    fn apply(self, config: &mut TrackmeConfig) {
        if self.no_file {
            config.output.file = None;
        } else if self.output.is_some() || self.name.is_some() {
            let current = config.output.file.take();
            config.output.file = Some(FileSpec {
                directory: self
                    .output
                    .or_else(|| current.as_ref().map(|f| f.directory.clone()))
                    .unwrap_or_else(|| PathBuf::from("recordings")),
                name: self.name.or_else(|| current.and_then(|f| f.name)),
            });
        }
        if let Some((host, port)) = self.network {
            let connect_timeout = config
                .output
                .network
                .as_ref()
                .map_or(DEFAULT_CONNECT_TIMEOUT, |n| n.connect_timeout);
            config.output.network = Some(NetworkSpec {
                host,
                port,
                connect_timeout,
            });
        }
        if let Some(path) = self.replay {
            config.producer.kind = ProducerKind::Replay;
            config.producer.replay = Some(ReplayConfig {
                path,
                pacing: if self.fast {
                    Pacing::Instant
                } else {
                    Pacing::Realistic
                },
            });
        }
        if self.samples.is_some() {
            config.producer.generator.max_samples = self.samples;
        }
        if self.seed.is_some() {
            config.producer.generator.seed = self.seed;
        }
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "compact" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        other => Err(format!(
            "unknown log format '{other}', expected pretty, compact or json"
        )),
    }
}

fn parse_endpoint(value: &str) -> Result<(String, u16), String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got '{value}'"))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port '{port}': {e}"))?;
    if host.is_empty() {
        return Err(format!("missing host in '{value}'"));
    }
    Ok((host.to_string(), port))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TrackmeConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    telemetry::init(&config.logging)?;

    match cli.command {
        Commands::Record(args) => record(config, args).await,
        Commands::Listen {
            bind,
            output,
            name,
            sessions,
        } => {
            let directory = output
                .or_else(|| config.output.file.as_ref().map(|f| f.directory.clone()))
                .unwrap_or_else(|| PathBuf::from("recordings"));
            listen(&bind, directory, name, sessions).await
        }
        Commands::Dump { file } => dump(&file).await,
        Commands::Convert { input, output } => convert(&input, &output).await,
    }
}

async fn record(mut config: TrackmeConfig, args: RecordArgs) -> Result<()> {
    let duration = args.duration;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let producer = config.producer.build().context("failed to create producer")?;
    let controller = RecordingController::from_config(&config);
    controller
        .start(producer)
        .await
        .context("failed to start recording")?;
    info!("Recording, press Ctrl-C to stop");

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping");
        }
        () = controller.finished() => info!("Session ended"),
        () = deadline => info!("Duration elapsed, stopping"),
    }

    match controller.stop().await {
        Some(outcome) => {
            let summary = outcome.context("recording failed")?;
            println!("Recorded {} events", summary.events);
            for sink in &summary.sinks {
                println!("  {}: {} records", sink.sink, sink.records);
            }
            Ok(())
        }
        None => bail!("no recording session was running"),
    }
}

async fn listen(bind: &str, directory: PathBuf, name: Option<String>, sessions: u32) -> Result<()> {
    let listener = StreamListener::bind(bind)
        .await
        .with_context(|| format!("failed to listen on {bind}"))?;
    let mut recorder = SessionRecorder::new(directory);
    if let Some(name) = name {
        recorder = recorder.with_name(name);
    }

    for _ in 0..sessions {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Interrupted, no longer accepting sessions");
                return Ok(());
            }
            summary = recorder.record(&listener) => {
                let summary = summary.context("failed to record session")?;
                if summary.truncated {
                    warn!(peer = %summary.peer, "Session ended without Stop");
                }
                println!(
                    "Recorded {} records from {} to {}",
                    summary.records,
                    summary.peer,
                    summary.path.display()
                );
            }
        }
    }
    Ok(())
}

async fn dump(path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let (events, skipped) = decode_all(&bytes);
    if skipped > 0 {
        warn!(skipped, "Bytes outside valid records were skipped");
    }

    let mut stdout = std::io::stdout().lock();
    for event in &events {
        writeln!(stdout, "{event}")?;
    }
    stdout.flush()?;
    Ok(())
}

async fn convert(input: &Path, output: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut records = Vec::new();
    let mut count = 0usize;
    let mut terminated = false;
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = line
            .parse()
            .with_context(|| format!("{}:{}", input.display(), index + 1))?;
        records.extend_from_slice(&event.to_record());
        terminated = event.is_stop();
        count += 1;
    }

    tokio::fs::write(output, &records)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Converted {count} records to {}", output.display());
    if !terminated {
        warn!(output = %output.display(), "Recording has no closing Stop record");
    }
    Ok(())
}
