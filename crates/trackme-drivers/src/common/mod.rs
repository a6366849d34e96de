//! Shared infrastructure for producers.
//!
//! - **pacing**: instant or real-time emission of generated and replayed samples
//! - **rng**: seeded random number generator for reproducible synthetic data
//! - **worker**: the sampling-thread bookkeeping every producer shares

pub mod pacing;
pub mod rng;
pub(crate) mod worker;

pub use pacing::Pacing;
pub use rng::SampleRng;
