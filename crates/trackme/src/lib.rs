//! Application layer of trackme.
//!
//! - [`config`]: figment-based configuration (`config/trackme.toml` plus
//!   `TRACKME_` environment overrides)
//! - [`telemetry`]: tracing subscriber setup
//! - [`controller`]: the [`RecordingController`] that runs recording sessions
//!
//! # Example
//!
//! ```no_run
//! use trackme::{telemetry, RecordingController, TrackmeConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = TrackmeConfig::load()?;
//! config.validate()?;
//! telemetry::init(&config.logging)?;
//!
//! let controller = RecordingController::from_config(&config);
//! controller.start(config.producer.build()?).await?;
//! controller.finished().await;
//! if let Some(outcome) = controller.stop().await {
//!     println!("{} events recorded", outcome?.events);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod telemetry;

pub use config::{
    ControllerConfig, OutputConfig, ProducerConfig, ProducerKind, ReplayConfig, TrackmeConfig,
    DEFAULT_CONFIG_PATH, ENV_PREFIX,
};
pub use controller::RecordingController;
pub use telemetry::{LogFormat, LoggingConfig};
