use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use vigil_core::app::{AppBuilder, Runtime, WorkerGroup};
use vigil_core::domain::{
    CompanyId, Configuration, DatasourceConfigurationId, DatasourceMeta, Matrix, Recording,
    TaskKind, TaskState, UploadCode,
};
use vigil_core::impls::JsonSignalLoader;
use vigil_core::pipeline::{DetectionRequest, TrainingRequest};
use vigil_core::ports::FixedClock;
use vigil_core::settings::Settings;

const SENSORS: usize = 4;
const CHUNK_SAMPLES: usize = 128;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

fn recording(chunks: usize, spike_chunk: Option<usize>) -> Recording {
    let rows = (0..SENSORS)
        .map(|s| {
            (0..chunks * CHUNK_SAMPLES)
                .map(|t| {
                    let value = (t as f64 * 0.05 + s as f64).sin();
                    if spike_chunk == Some(t / CHUNK_SAMPLES) {
                        value + 8.0
                    } else {
                        value
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

struct Setup {
    runtime: Arc<Runtime>,
    clock: Arc<FixedClock>,
    loader: JsonSignalLoader,
    company: CompanyId,
    datasource: DatasourceConfigurationId,
    _dir: TempDir,
}

impl Setup {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.train_root_folder = dir.path().join("train");
        settings.upload_root_folder = dir.path().join("uploads");
        settings.training.input_size = 32;
        settings.queue.poll_timeout_ms = 20;

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        ));
        let loader = JsonSignalLoader::new(settings.upload_root_folder.clone());
        let runtime = AppBuilder::new(settings)
            .with_clock(clock.clone())
            .build()
            .unwrap();

        let company = runtime.context().ids.generate_company_id();
        runtime
            .register_company_configuration(
                company,
                Configuration::try_from(json!({
                    "datasource_class": "flight",
                    "model": {
                        "class_name": "baseline",
                        "configuration": {"model_configuration": {"train_iters": 50000}}
                    },
                    "transformer": {"class_name": "window", "configuration": {}}
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        let datasource = runtime
            .register_datasource_configuration(
                company,
                "flight-data",
                DatasourceMeta {
                    number_of_sensors: Some(SENSORS as u64),
                    ..DatasourceMeta::default()
                },
            )
            .await
            .unwrap()
            .id;

        Self {
            runtime: Arc::new(runtime),
            clock,
            loader,
            company,
            datasource,
            _dir: dir,
        }
    }

    async fn upload(&self, name: &str, recording: &Recording) -> UploadCode {
        let location = format!("{name}.json");
        self.loader.save(Path::new(&location), recording).unwrap();
        self.runtime
            .register_upload(self.company, self.datasource, name, location)
            .await
            .unwrap()
            .code
    }

    fn training_request(&self, name: &str) -> TrainingRequest {
        TrainingRequest {
            name: name.to_string(),
            company_id: self.company,
            datasource_configuration_id: self.datasource,
            parent: None,
            enable_fft: None,
            train_iters: 100,
            downsample_factor: 4,
        }
    }
}

#[tokio::test]
async fn train_detect_diagnose_end_to_end() {
    let setup = Setup::new().await;
    let runtime = &setup.runtime;
    setup.upload("first", &recording(10, None)).await;
    setup.upload("second", &recording(10, None)).await;

    let training = runtime
        .submit_training(setup.training_request("baseline-v1"))
        .await
        .unwrap();
    let config = &training.configuration;
    assert_eq!(config.datasource_class().unwrap(), "flight");
    assert_eq!(config.train_iters(), Some(100));
    assert_eq!(config.transformer_value("downsample_factor"), Some(&json!(4)));
    assert_eq!(
        runtime
            .status(TaskKind::Training, &training.code)
            .await
            .unwrap()
            .state,
        Some(TaskState::Queued)
    );

    setup.clock.advance(TimeDelta::seconds(5));
    assert_eq!(runtime.drain(DRAIN_TIMEOUT).await.unwrap(), 1);

    let status = runtime
        .status(TaskKind::Training, &training.code)
        .await
        .unwrap();
    assert_eq!(status.state, Some(TaskState::Successful));
    assert!(status.is_completed);
    let stored = runtime
        .context()
        .store
        .get_training(&training.code)
        .await
        .unwrap();
    assert!(stored.configuration.calibration().is_some());

    let flight = setup.upload("flight", &recording(10, Some(6))).await;
    let available = runtime.available_trainings_for(&flight).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].code, training.code);

    let detection = runtime
        .submit_detection(DetectionRequest {
            name: "flight-check".to_string(),
            company_id: setup.company,
            upload_code: flight,
            training_code: training.code.clone(),
        })
        .await
        .unwrap();
    // detection, then the diagnostic it enqueues
    assert_eq!(runtime.drain(DRAIN_TIMEOUT).await.unwrap(), 2);

    let result = runtime.detection_result(&detection.code).await.unwrap();
    assert_eq!(result.scores.len(), 10);

    let diagnostic = runtime
        .status(TaskKind::Diagnostic, &detection.code)
        .await
        .unwrap();
    assert_eq!(diagnostic.state, Some(TaskState::Successful));
    assert_eq!(
        diagnostic.message,
        Some(format!(
            "Diagnostic for {} has completed successfully!",
            detection.code
        ))
    );

    let groups = runtime
        .grouped_diagnostic_result(&detection.code)
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].index, 5);
    assert_eq!(groups[0].original.shape(), (SENSORS, 96));
    assert!(
        !runtime
            .is_frequency_domain(TaskKind::Diagnostic, &detection.code)
            .await
            .unwrap()
    );

    runtime.delete_detection(&detection.code).await.unwrap();
    assert!(
        runtime
            .status(TaskKind::Detection, &detection.code)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(runtime.detection_result(&detection.code).await.is_err());
}

#[tokio::test]
async fn failed_training_is_reported_and_not_offered() {
    let setup = Setup::new().await;
    let runtime = &setup.runtime;
    // the datasource promises 4 sensors, this recording carries 2
    let narrow = Recording {
        sample_rate: 100.0,
        signal: Matrix::from_rows(vec![vec![0.0; 1280], vec![1.0; 1280]]).unwrap(),
    };
    let upload = setup.upload("narrow", &narrow).await;

    let training = runtime
        .submit_training(setup.training_request("broken"))
        .await
        .unwrap();
    runtime.drain(DRAIN_TIMEOUT).await.unwrap();

    let status = runtime
        .status(TaskKind::Training, &training.code)
        .await
        .unwrap();
    assert_eq!(status.state, Some(TaskState::Failed));
    assert!(status.message.unwrap().contains("sensors"));
    assert!(runtime.available_trainings_for(&upload).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_group_runs_submitted_jobs() {
    let setup = Setup::new().await;
    setup.upload("first", &recording(6, None)).await;

    let workers = WorkerGroup::spawn(2, setup.runtime.clone());
    let training = setup
        .runtime
        .submit_training(setup.training_request("background"))
        .await
        .unwrap();

    let mut state = None;
    for _ in 0..200 {
        let status = setup
            .runtime
            .status(TaskKind::Training, &training.code)
            .await
            .unwrap();
        if status.is_completed {
            state = status.state;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    workers.shutdown_and_join().await;

    assert_eq!(state, Some(TaskState::Successful));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_submitted_during_shutdown_is_not_lost() {
    let setup = Setup::new().await;
    setup.upload("first", &recording(6, None)).await;

    let workers = WorkerGroup::spawn(1, setup.runtime.clone());
    workers.request_shutdown();
    let training = setup
        .runtime
        .submit_training(setup.training_request("late"))
        .await
        .unwrap();
    workers.shutdown_and_join().await;

    // either the stopping worker ran the job, or it is still queued
    setup.runtime.drain(DRAIN_TIMEOUT).await.unwrap();
    let status = setup
        .runtime
        .status(TaskKind::Training, &training.code)
        .await
        .unwrap();
    assert_eq!(status.state, Some(TaskState::Successful));
}
