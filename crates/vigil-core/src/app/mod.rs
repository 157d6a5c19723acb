//! App: wiring and the surfaces built on the pipeline.
//!
//! - **AppBuilder**: assembles ports, components and job handlers
//! - **Runtime**: submission, query and dispatch API
//! - **WorkerGroup**: queue consumers with graceful shutdown
//! - **StatusView**: serializable task progress

pub mod builder;
pub mod runtime;
pub mod status;
pub mod worker_loop;

pub use self::builder::{AppBuilder, BuildError};
pub use self::runtime::Runtime;
pub use self::status::StatusView;
pub use self::worker_loop::WorkerGroup;
