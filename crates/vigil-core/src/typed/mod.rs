//! Typed job API.
//!
//! - surface: `Task` and `Handler<T>`, checked at compile time
//! - inside: `DynHandler`, object-safe, stored in `TypedRegistry`

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;
