//! AppBuilder: wires ports, components and handlers into a `Runtime`.
//!
//! Every port has an in-process default, so `AppBuilder::new(settings).build()`
//! gives a working single-process pipeline. `build()` checks that every task
//! type named with `expect_tasks` has a handler.

use std::sync::Arc;

use crate::components::ComponentRegistry;
use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore, JsonSignalLoader};
use crate::pipeline::PipelineContext;
use crate::pipeline::jobs::{
    DetectHandler, DetectJob, DiagnoseHandler, DiagnoseJob, TrainHandler, TrainJob,
};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, SignalLoader, SystemClock, TaskStore, UlidGenerator};
use crate::settings::Settings;
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

use super::runtime::Runtime;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct AppBuilder {
    settings: Settings,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    loader: Option<Arc<dyn SignalLoader>>,
    components: Option<ComponentRegistry>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    registry: TypedRegistry,
    expected_tasks: Option<Vec<String>>,
}

impl AppBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            queue: None,
            loader: None,
            components: None,
            clock: None,
            ids: None,
            registry: TypedRegistry::new(),
            expected_tasks: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn SignalLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_components(mut self, components: ComponentRegistry) -> Self {
        self.components = Some(components);
        self
    }

    /// Also drives the default id generator, so codes follow this clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Registers a handler for an extra job type next to the pipeline's own.
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Runtime, BuildError> {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let loader = self.loader.unwrap_or_else(|| {
            Arc::new(JsonSignalLoader::new(
                self.settings.upload_root_folder.clone(),
            ))
        });
        let ctx = PipelineContext {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new())),
            queue: self
                .queue
                .unwrap_or_else(|| Arc::new(InMemoryDeliveryQueue::new())),
            loader,
            components: Arc::new(
                self.components
                    .unwrap_or_else(ComponentRegistry::with_defaults),
            ),
            clock,
            ids,
            settings: Arc::new(self.settings),
        };

        let mut registry = self.registry;
        registry.register::<TrainJob, _>(TrainHandler::new(ctx.clone()))?;
        registry.register::<DetectJob, _>(DetectHandler::new(ctx.clone()))?;
        registry.register::<DiagnoseJob, _>(DiagnoseHandler::new(ctx.clone()))?;

        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|x| !registered_types.contains(x))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        Ok(Runtime::new(ctx, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::pipeline::PIPELINE_TASK_TYPES;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Export {
        code: String,
    }

    impl Task for Export {
        const TYPE: &'static str = "vigil.reports.export.v1";

        fn dedupe_key(&self) -> String {
            format!("export:{}", self.code)
        }
    }

    struct ExportHandler;

    #[async_trait]
    impl Handler<Export> for ExportHandler {
        async fn handle(&self, _task: Export) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn pipeline_handlers_are_always_registered() {
        let runtime = AppBuilder::new(Settings::default())
            .expect_tasks(&PIPELINE_TASK_TYPES)
            .build()
            .unwrap();
        assert_eq!(runtime.registry().registered_types().len(), 3);
    }

    #[test]
    fn extra_handlers_join_the_pipeline_ones() {
        let runtime = AppBuilder::new(Settings::default())
            .register::<Export, _>(ExportHandler)
            .unwrap()
            .expect_tasks(&[Export::TYPE, TrainJob::TYPE])
            .build()
            .unwrap();
        assert!(
            runtime
                .registry()
                .registered_types()
                .contains(&Export::TYPE.to_string())
        );
    }

    #[test]
    fn missing_expected_task_fails_the_build() {
        let result = AppBuilder::new(Settings::default())
            .expect_tasks(&[TrainJob::TYPE, Export::TYPE])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingTaskTypes(missing)) if missing == vec![Export::TYPE.to_string()]
        ));
    }

    #[test]
    fn overriding_a_pipeline_job_type_is_rejected() {
        struct Shadow;

        #[async_trait]
        impl Handler<TrainJob> for Shadow {
            async fn handle(&self, _task: TrainJob) -> Result<()> {
                Ok(())
            }
        }

        let result = AppBuilder::new(Settings::default())
            .register::<TrainJob, _>(Shadow)
            .unwrap()
            .build();
        assert!(matches!(result, Err(BuildError::Registry(_))));
    }
}
