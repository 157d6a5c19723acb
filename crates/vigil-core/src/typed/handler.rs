//! Handler<T> and its type-erased form.
//!
//! `Handler<T>` only ever sees `T`; `TypedHandler<T, H>` decodes the JSON
//! payload and exposes the pair as a `DynHandler` so handlers of different
//! job types can share one map.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::Task;
use crate::error::{PipelineError, Result};

#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<()>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<()>;

    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<()> {
        let task: T = serde_json::from_value(payload).map_err(|e| {
            PipelineError::InvalidInput(format!("cannot decode {} payload: {e}", T::TYPE))
        })?;
        self.handler.handle(task).await
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}
