//! Pipeline context over in-memory backends and a temp directory.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use super::{PipelineContext, TrainingRequest, run_training, submit_training};
use crate::components::ComponentRegistry;
use crate::domain::{
    CompanyConfiguration, CompanyId, Configuration, DatasourceConfiguration,
    DatasourceConfigurationId, DatasourceMeta, Matrix, Recording, TrainingTask, Upload,
    UploadCode,
};
use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore, JsonSignalLoader};
use crate::ports::{Clock, FixedClock, IdGenerator, UlidGenerator};
use crate::settings::Settings;

pub(crate) const SENSORS: usize = 4;
/// Raw samples per chunk: 32 timesteps after a downsample of 4.
pub(crate) const CHUNK_SAMPLES: usize = 128;

pub(crate) struct Fixture {
    pub ctx: PipelineContext,
    pub queue: Arc<InMemoryDeliveryQueue>,
    pub loader: JsonSignalLoader,
    pub company: CompanyId,
    pub datasource: DatasourceConfigurationId,
    /// Claims more sensors than the recordings carry.
    pub wide_datasource: DatasourceConfigurationId,
    _dir: TempDir,
}

/// Sine per sensor; `spike` adds a large offset to those chunks.
pub(crate) fn synthetic_recording(chunks: usize, spike: Option<Range<usize>>) -> Recording {
    let samples = chunks * CHUNK_SAMPLES;
    let rows = (0..SENSORS)
        .map(|s| {
            (0..samples)
                .map(|t| {
                    let base = (t as f64 * 0.05 + s as f64).sin();
                    match &spike {
                        Some(range) if range.contains(&(t / CHUNK_SAMPLES)) => base + 8.0,
                        _ => base,
                    }
                })
                .collect()
        })
        .collect();
    Recording {
        sample_rate: 100.0,
        signal: Matrix::from_rows(rows).unwrap(),
    }
}

pub(crate) fn training_request(fixture: &Fixture, name: &str) -> TrainingRequest {
    TrainingRequest {
        name: name.to_string(),
        company_id: fixture.company,
        datasource_configuration_id: fixture.datasource,
        parent: None,
        enable_fft: None,
        train_iters: 100,
        downsample_factor: 4,
    }
}

async fn add_datasource(
    ctx: &PipelineContext,
    company: CompanyId,
    name: &str,
    sensors: u64,
) -> DatasourceConfigurationId {
    let id = ctx.ids.generate_datasource_configuration_id();
    ctx.store
        .insert_datasource_configuration(DatasourceConfiguration {
            id,
            company_id: company,
            name: name.to_string(),
            meta: DatasourceMeta {
                number_of_sensors: Some(sensors),
                ..DatasourceMeta::default()
            },
        })
        .await
        .unwrap();
    id
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.train_root_folder = dir.path().join("train");
        settings.upload_root_folder = dir.path().join("uploads");
        settings.training.input_size = 32;

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        let loader = JsonSignalLoader::new(settings.upload_root_folder.clone());

        let ctx = PipelineContext {
            store: Arc::new(InMemoryTaskStore::new()),
            queue: queue.clone(),
            loader: Arc::new(loader.clone()),
            components: Arc::new(ComponentRegistry::with_defaults()),
            clock: clock.clone(),
            ids: ids.clone(),
            settings: Arc::new(settings),
        };

        let company = ids.generate_company_id();
        ctx.store
            .insert_company_configuration(CompanyConfiguration {
                id: ids.generate_company_configuration_id(),
                company_id: company,
                configuration: Configuration::try_from(json!({
                    "datasource_class": "flight",
                    "model": {
                        "class_name": "baseline",
                        "configuration": {"model_configuration": {"train_iters": 50}}
                    },
                    "transformer": {"class_name": "window", "configuration": {}}
                }))
                .unwrap(),
                created_at: clock.now(),
            })
            .await
            .unwrap();

        let datasource = add_datasource(&ctx, company, "flight-data", SENSORS as u64).await;
        let wide_datasource = add_datasource(&ctx, company, "wide", 8).await;
        let fixture = Self {
            ctx,
            queue,
            loader,
            company,
            datasource,
            wide_datasource,
            _dir: dir,
        };
        fixture
            .add_upload(fixture.datasource, "first", &synthetic_recording(10, None))
            .await;
        fixture
            .add_upload(fixture.datasource, "second", &synthetic_recording(10, None))
            .await;
        fixture
            .add_upload(fixture.wide_datasource, "narrow", &synthetic_recording(10, None))
            .await;
        fixture
    }

    pub async fn add_upload(
        &self,
        datasource: DatasourceConfigurationId,
        name: &str,
        recording: &Recording,
    ) -> UploadCode {
        let code = self.ctx.ids.generate_upload_code();
        let location = PathBuf::from(format!("{code}.json"));
        self.loader.save(&location, recording).unwrap();
        self.ctx
            .store
            .insert_upload(Upload {
                code: code.clone(),
                company_id: self.company,
                datasource_configuration_id: datasource,
                name: name.to_string(),
                location,
            })
            .await
            .unwrap();
        code
    }

    /// Jobs waiting in the pipeline namespace.
    pub fn queued(&self) -> usize {
        self.queue.len(&self.ctx.settings.queue.namespace)
    }

    /// Submits and runs a training without going through the queue.
    pub async fn trained(&self, name: &str) -> TrainingTask {
        let task = submit_training(&self.ctx, training_request(self, name))
            .await
            .unwrap();
        run_training(&self.ctx, &task.code).await.unwrap();
        self.ctx.store.get_training(&task.code).await.unwrap()
    }
}
