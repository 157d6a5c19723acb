//! Impls: in-process port implementations and the reference engine.
//!
//! - **InMemoryTaskStore** / **InMemoryDeliveryQueue**: single-process backends
//! - **JsonSignalLoader**: recordings as JSON files
//! - **WindowTransformer**, **BaselineDetective**, **ScoreDistributionAnalyzer**,
//!   **ChunkedDataSource**: the components registered by default

pub mod analyzer;
pub mod baseline;
pub mod chunked;
pub mod inmem_delivery;
pub mod json_loader;
pub mod memory_store;
pub mod window;

pub use self::analyzer::ScoreDistributionAnalyzer;
pub use self::baseline::BaselineDetective;
pub use self::chunked::ChunkedDataSource;
pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::json_loader::JsonSignalLoader;
pub use self::memory_store::InMemoryTaskStore;
pub use self::window::WindowTransformer;
