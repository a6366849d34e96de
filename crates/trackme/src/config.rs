//! Application configuration loaded with figment.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. a TOML file (`config/trackme.toml` unless another path is given)
//! 3. environment variables prefixed with `TRACKME_`; nested keys are
//!    separated by a double underscore, e.g.
//!    `TRACKME_OUTPUT__NETWORK__HOST=192.168.0.10`
//!
//! ```toml
//! [queue]
//! policy = "bounded"
//! capacity = 1024
//!
//! [output.file]
//! directory = "recordings"
//!
//! [output.network]
//! host = "192.168.0.10"
//! port = 50000
//! connect_timeout = "5s"
//!
//! [producer]
//! kind = "synthetic"
//! sources = ["accelerometer", "gyroscope", "magnetic_field"]
//!
//! [producer.generator]
//! rate_hz = 50.0
//! pacing = "realistic"
//!
//! [controller]
//! start_delay = "300ms"
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```
//!
//! When the `[output]` section is absent entirely, recordings go to
//! `./recordings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use trackme_core::{EventKind, PipelineError, Producer, QueuePolicy, Result};
use trackme_drivers::{AnyProducer, GeneratorConfig, Pacing, SyntheticProducer};
use trackme_storage::{FileSpec, NetworkSpec};

use crate::telemetry::{parse_log_level, LoggingConfig};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/trackme.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TRACKME_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackmeConfig {
    /// Event queue policy
    #[serde(default)]
    pub queue: QueuePolicy,
    /// Output sinks
    #[serde(default = "default_output")]
    pub output: OutputConfig,
    /// Event producer
    #[serde(default)]
    pub producer: ProducerConfig,
    /// Session lifecycle
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output sinks. A sink is enabled by the presence of its section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// `[output.file]`
    #[serde(default)]
    pub file: Option<FileSpec>,
    /// `[output.network]`
    #[serde(default)]
    pub network: Option<NetworkSpec>,
}

/// Which producer `trackme record` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    /// Seeded waveform generator
    #[default]
    Synthetic,
    /// Replay of a recorded `.sns` file
    Replay,
}

/// The `[producer.replay]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Recording to play back
    pub path: PathBuf,
    /// Playback speed
    #[serde(default = "default_replay_pacing")]
    pub pacing: Pacing,
}

/// The `[producer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Producer implementation
    #[serde(default)]
    pub kind: ProducerKind,
    /// Sensor kinds to sample; empty means every sensor kind
    #[serde(default = "default_sources")]
    pub sources: Vec<EventKind>,
    /// Generator settings, used when `kind = "synthetic"`
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Replay settings, required when `kind = "replay"`
    #[serde(default)]
    pub replay: Option<ReplayConfig>,
}

/// The `[controller]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Pause between opening the sinks and starting the producer
    #[serde(with = "humantime_serde", default = "default_start_delay")]
    pub start_delay: Duration,
}

fn default_output() -> OutputConfig {
    OutputConfig {
        file: Some(FileSpec {
            directory: PathBuf::from("recordings"),
            name: None,
        }),
        network: None,
    }
}

fn default_sources() -> Vec<EventKind> {
    vec![
        EventKind::Accelerometer,
        EventKind::Gyroscope,
        EventKind::MagneticField,
    ]
}

fn default_replay_pacing() -> Pacing {
    Pacing::Realistic
}

fn default_start_delay() -> Duration {
    Duration::from_millis(300)
}

impl Default for TrackmeConfig {
    fn default() -> Self {
        Self {
            queue: QueuePolicy::default(),
            output: default_output(),
            producer: ProducerConfig::default(),
            controller: ControllerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            kind: ProducerKind::default(),
            sources: default_sources(),
            generator: GeneratorConfig::default(),
            replay: None,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            start_delay: default_start_delay(),
        }
    }
}

impl TrackmeConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack behind [`load_from`](Self::load_from), for callers
    /// that merge further overrides.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.logging.level)?;

        if self.output.file.is_none() && self.output.network.is_none() {
            return Err(invalid(
                "no output configured, add [output.file] or [output.network]",
            ));
        }
        if let Some(file) = &self.output.file {
            if file.directory.as_os_str().is_empty() {
                return Err(invalid("output.file.directory must not be empty"));
            }
            if matches!(&file.name, Some(name) if name.is_empty() || name.contains(['/', '\\'])) {
                return Err(invalid("output.file.name must be a plain file name"));
            }
        }
        if let Some(network) = &self.output.network {
            if network.host.trim().is_empty() {
                return Err(invalid("output.network.host must not be empty"));
            }
            if network.port == 0 {
                return Err(invalid("output.network.port must be non-zero"));
            }
            if network.connect_timeout.is_zero() {
                return Err(invalid("output.network.connect_timeout must be positive"));
            }
        }

        self.producer.validate()
    }
}

impl ProducerConfig {
    fn validate(&self) -> Result<()> {
        if let Some(kind) = self.sources.iter().find(|k| k.is_control()) {
            return Err(invalid(format!(
                "producer.sources may only name sensor kinds, found '{kind}'"
            )));
        }
        match self.kind {
            ProducerKind::Synthetic => {
                if self.generator.period().is_none() {
                    return Err(invalid(format!(
                        "producer.generator.rate_hz must give a positive sample period, got {}",
                        self.generator.rate_hz
                    )));
                }
            }
            ProducerKind::Replay => {
                if self.replay.is_none() {
                    return Err(invalid(
                        "producer.kind = \"replay\" requires a [producer.replay] section",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Construct the configured producer with its sources registered.
    pub fn build(&self) -> Result<AnyProducer> {
        let mut producer = match self.kind {
            ProducerKind::Synthetic => {
                AnyProducer::from(SyntheticProducer::generator(self.generator.clone()))
            }
            ProducerKind::Replay => {
                let replay = self.replay.as_ref().ok_or_else(|| {
                    invalid("producer.kind = \"replay\" requires a [producer.replay] section")
                })?;
                AnyProducer::from(SyntheticProducer::replay(&replay.path, replay.pacing)?)
            }
        };
        for kind in &self.sources {
            producer.add_source(*kind)?;
        }
        Ok(producer)
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(message.into())
}
