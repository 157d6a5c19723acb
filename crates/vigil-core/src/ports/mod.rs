//! Ports: the seams between the pipeline and its backends.
//!
//! - **TaskStore**: tasks, status history and results
//! - **DeliveryQueue**: job envelopes for the worker group
//! - **engine**: detective, transformer, analyzer and data source contracts
//! - **SignalLoader**: raw recordings
//! - **Clock** / **IdGenerator**: time and ids, swappable in tests

pub mod clock;
pub mod delivery_queue;
pub mod engine;
pub mod id_generator;
pub mod signal_loader;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::{DeliveryQueue, QueueError};
pub use self::engine::{DataSource, DataSourceFactory, Detective, PerformanceAnalyzer, Transformer};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::signal_loader::SignalLoader;
pub use self::task_store::TaskStore;
