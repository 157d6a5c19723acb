//! Anomaly-detection task pipeline: train → detect → diagnose.
//!
//! - `domain`: records, configuration, signals and results
//! - `ports`: store, queue, loader, clock and engine traits
//! - `impls`: in-process backends and the reference engine
//! - `pipeline`: the three stages
//! - `app`: builder, runtime and worker group

pub mod app;
pub mod components;
pub mod domain;
pub mod error;
pub mod impls;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod typed;

pub use crate::error::{PipelineError, Result};
