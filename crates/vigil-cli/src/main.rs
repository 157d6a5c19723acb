//! vigil: run the train → detect → diagnose pipeline from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_core::app::{AppBuilder, Runtime, WorkerGroup};
use vigil_core::domain::{
    CompanyId, Configuration, DatasourceMeta, Matrix, Recording, TaskCode, TaskKind, TaskState,
};
use vigil_core::impls::JsonSignalLoader;
use vigil_core::pipeline::{DetectionRequest, TrainingRequest};
use vigil_core::settings::Settings;

const STATUS_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Anomaly-detection pipeline for sensor recordings")]
#[command(version)]
struct Cli {
    /// Settings file (TOML); defaults are used when absent
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on recordings, then detect and diagnose the given uploads
    Run {
        /// Company configuration (JSON) naming the engine components
        #[arg(long)]
        company_config: PathBuf,

        /// Sensors per recording
        #[arg(long)]
        sensors: u64,

        #[arg(long, default_value_t = 4)]
        downsample_factor: u64,

        #[arg(long, default_value_t = 1000)]
        train_iters: u64,

        #[arg(long)]
        enable_fft: bool,

        /// Training recordings, relative to the upload root
        #[arg(long, required = true, num_args = 1..)]
        train: Vec<PathBuf>,

        /// Recordings to run detection on, relative to the upload root
        #[arg(long, num_args = 1..)]
        detect: Vec<PathBuf>,
    },
    /// Generate synthetic recordings and run the whole pipeline on them
    Demo {
        #[arg(long, default_value_t = 20)]
        chunks: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Run {
            company_config,
            sensors,
            downsample_factor,
            train_iters,
            enable_fft,
            train,
            detect,
        } => {
            let configuration = read_configuration(&company_config)?;
            let job = PipelineJob {
                configuration,
                sensors,
                downsample_factor,
                train_iters,
                enable_fft,
                train,
                detect,
            };
            run(settings, job).await
        }
        Command::Demo { chunks } => demo(settings, chunks).await,
    }
}

fn read_configuration(path: &Path) -> Result<Configuration> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(Configuration::try_from(value)?)
}

struct PipelineJob {
    configuration: Configuration,
    sensors: u64,
    downsample_factor: u64,
    train_iters: u64,
    enable_fft: bool,
    train: Vec<PathBuf>,
    detect: Vec<PathBuf>,
}

async fn run(settings: Settings, job: PipelineJob) -> Result<()> {
    let workers = settings.queue.workers;
    let runtime = Arc::new(AppBuilder::new(settings).build()?);
    let group = WorkerGroup::spawn(workers, runtime.clone());

    let outcome = tokio::select! {
        outcome = execute(&runtime, job, None) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping workers");
            Ok(())
        }
    };
    group.shutdown_and_join().await;
    outcome
}

/// Registers the uploads, trains, then detects on each detection upload.
///
/// With `drain` set, queued jobs run on the caller's task; otherwise a worker
/// group is expected to pick them up.
async fn execute(runtime: &Runtime, job: PipelineJob, drain: Option<Duration>) -> Result<()> {
    let company: CompanyId = runtime.context().ids.generate_company_id();
    runtime
        .register_company_configuration(company, job.configuration)
        .await?;
    let datasource = runtime
        .register_datasource_configuration(
            company,
            "cli",
            DatasourceMeta {
                number_of_sensors: Some(job.sensors),
                downsample_factor: Some(job.downsample_factor),
                ..DatasourceMeta::default()
            },
        )
        .await?;
    for path in &job.train {
        runtime
            .register_upload(company, datasource.id, path.display().to_string(), path)
            .await?;
    }

    let training = runtime
        .submit_training(TrainingRequest {
            name: "cli".to_string(),
            company_id: company,
            datasource_configuration_id: datasource.id,
            parent: None,
            enable_fft: job.enable_fft.then_some(true),
            train_iters: job.train_iters,
            downsample_factor: job.downsample_factor,
        })
        .await?;
    settle(runtime, drain).await?;
    let state = wait_for(runtime, TaskKind::Training, &training.code).await?;
    if state != TaskState::Successful {
        let status = runtime.status(TaskKind::Training, &training.code).await?;
        bail!(
            "training {} ended {state}: {}",
            training.code,
            status.message.unwrap_or_default()
        );
    }

    for path in &job.detect {
        let upload = runtime
            .register_upload(company, datasource.id, path.display().to_string(), path)
            .await?;
        let detection = runtime
            .submit_detection(DetectionRequest {
                name: path.display().to_string(),
                company_id: company,
                upload_code: upload.code,
                training_code: training.code.clone(),
            })
            .await?;
        settle(runtime, drain).await?;
        report(runtime, &detection.code).await?;
    }
    Ok(())
}

async fn settle(runtime: &Runtime, drain: Option<Duration>) -> Result<()> {
    if let Some(timeout) = drain {
        let executed = runtime.drain(timeout).await?;
        info!(executed, "queue drained");
    }
    Ok(())
}

/// Polls until the task reaches a terminal state. A task that does not
/// exist yet is waited for.
async fn wait_for(runtime: &Runtime, kind: TaskKind, code: &TaskCode) -> Result<TaskState> {
    loop {
        match runtime.status(kind, code).await {
            Ok(status) => {
                if let Some(state) = status.state
                    && state.is_terminal()
                {
                    info!(%kind, task = %code, %state, "task completed");
                    return Ok(state);
                }
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        tokio::time::sleep(STATUS_POLL).await;
    }
}

async fn report(runtime: &Runtime, code: &TaskCode) -> Result<()> {
    if wait_for(runtime, TaskKind::Detection, code).await? != TaskState::Successful {
        let status = runtime.status(TaskKind::Detection, code).await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    let result = runtime.detection_result(code).await?;
    wait_for(runtime, TaskKind::Diagnostic, code).await?;
    let diagnostic = runtime.status(TaskKind::Diagnostic, code).await?;
    let regions: Vec<serde_json::Value> = runtime
        .grouped_diagnostic_result(code)
        .await
        .unwrap_or_default()
        .iter()
        .map(|group| {
            json!({
                "first_chunk": group.index,
                "time_offset": group.time_offset,
                "columns": group.original.cols(),
            })
        })
        .collect();

    let summary = json!({
        "detection": code,
        "scores": result.scores,
        "diagnostic": diagnostic,
        "regions": regions,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

const DEMO_SENSORS: usize = 4;
const DEMO_CHUNK_SAMPLES: usize = 128;

fn demo_recording(chunks: usize, spike: Option<usize>) -> Result<Recording> {
    let mut rng = rand::thread_rng();
    let rows = (0..DEMO_SENSORS)
        .map(|s| {
            (0..chunks * DEMO_CHUNK_SAMPLES)
                .map(|t| {
                    let noise: f64 = rng.gen_range(-0.05..0.05);
                    let spike = match spike {
                        Some(chunk) if t / DEMO_CHUNK_SAMPLES == chunk => 6.0,
                        _ => 0.0,
                    };
                    (t as f64 * 0.05 + s as f64).sin() + noise + spike
                })
                .collect()
        })
        .collect();
    Ok(Recording {
        sample_rate: 100.0,
        signal: Matrix::from_rows(rows)?,
    })
}

async fn demo(mut settings: Settings, chunks: usize) -> Result<()> {
    if chunks < 3 {
        bail!("the demo needs at least 3 chunks");
    }
    let root = std::env::temp_dir().join(format!("vigil-demo-{}", std::process::id()));
    settings.train_root_folder = root.join("train");
    settings.upload_root_folder = root.join("uploads");
    // 32 timesteps per chunk with 4 sensors and a downsample of 4
    settings.training.input_size = 32;
    info!(root = %root.display(), "writing demo data");

    let loader = JsonSignalLoader::new(settings.upload_root_folder.clone());
    let mut train = Vec::new();
    for name in ["demo-a.json", "demo-b.json"] {
        loader.save(Path::new(name), &demo_recording(chunks, None)?)?;
        train.push(PathBuf::from(name));
    }
    loader.save(
        Path::new("demo-flight.json"),
        &demo_recording(chunks, Some(chunks / 2))?,
    )?;

    let runtime = AppBuilder::new(settings).build()?;
    let job = PipelineJob {
        configuration: Configuration::try_from(json!({
            "datasource_class": "flight",
            "model": {"class_name": "baseline"},
            "transformer": {"class_name": "window"}
        }))?,
        sensors: DEMO_SENSORS as u64,
        downsample_factor: 4,
        train_iters: 100,
        enable_fft: false,
        train,
        detect: vec![PathBuf::from("demo-flight.json")],
    };
    execute(&runtime, job, Some(Duration::from_millis(100))).await?;

    if let Err(err) = std::fs::remove_dir_all(&root) {
        warn!(error = %err, "could not remove demo data");
    }
    Ok(())
}
