//! Diagnostic stage.
//!
//! Picks the chunks around the most anomalous point of a detection and
//! stores each one next to the engine's reconstruction of it.

use tracing::{debug, info};

use super::detection::prepare_inference;
use super::grouping::{cumulative_result, group_adjacent_chunks};
use super::{PipelineContext, already_completed, blocking, warn_missing};
use crate::domain::{
    CalibrationParameters, DetectionResult, DiagnosticChunk, DiagnosticResult, TaskCode,
    TaskKind, TaskState,
};
use crate::error::Result;
use crate::settings::DiagnosticSettings;

/// Indices of the chunks to diagnose, in ascending order.
///
/// The probability timeline is resampled into `resample_rule_ms` buckets; the
/// first bucket with the highest mean marks the anomalous region. The highest
/// raw probability within `neighborhood_ms` of that bucket is mapped back to
/// the first chunk carrying exactly that value, and `radius` chunks on each
/// side are added. Index 0 is moved to 1 so the window always has a left
/// neighbour; the window is clipped to the chunks that exist.
pub fn most_anomalous_chunks(
    result: &DetectionResult,
    calibration: Option<CalibrationParameters>,
    settings: &DiagnosticSettings,
) -> Vec<usize> {
    let count = result.scores.len();
    if count == 0 {
        return Vec::new();
    }
    let probabilities = result.probabilities(calibration);
    let timeline = result.timeline(calibration);

    let Some((peak_at, _)) = timeline
        .resample_mean(settings.resample_rule_ms)
        .first_max()
    else {
        return Vec::new();
    };
    let Some(peak) = timeline.max_within(peak_at, settings.neighborhood_ms) else {
        return Vec::new();
    };
    let position = probabilities
        .iter()
        .position(|p| *p == peak)
        .unwrap_or_default();

    let center = position.max(1).min(count - 1);
    let first = center.saturating_sub(settings.radius);
    let last = (center + settings.radius).min(count - 1);
    (first..=last).collect()
}

pub async fn run_diagnostic(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    let task = warn_missing(
        ctx.store.get_diagnostic(code).await,
        TaskKind::Diagnostic,
        code,
    )?;
    if already_completed(&task.statuses, TaskKind::Diagnostic, code) {
        return Ok(());
    }

    ctx.append_status(
        TaskKind::Diagnostic,
        code,
        TaskState::Started,
        format!("Diagnostic for {code} has started!"),
    )
    .await?;

    match diagnose(ctx, code).await {
        Ok(()) => {
            ctx.append_status(
                TaskKind::Diagnostic,
                code,
                TaskState::Successful,
                format!("Diagnostic for {code} has completed successfully!"),
            )
            .await?;
            info!(task = %code, "diagnostic finished");
            Ok(())
        }
        Err(err) => Err(ctx.record_failure(TaskKind::Diagnostic, code, err).await),
    }
}

async fn diagnose(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    let task = ctx.store.get_diagnostic(code).await?;
    let detection = ctx.store.get_detection(&task.detection_code).await?;
    let training = ctx.store.get_training(&detection.training_code).await?;
    let result = ctx.store.detection_result(&detection.code).await?;
    let upload = ctx.store.get_upload(&task.upload_code).await?;
    let company = ctx
        .store
        .active_company_configuration(task.company_id)
        .await?;

    let indices = most_anomalous_chunks(
        &result,
        training.configuration.calibration(),
        &ctx.settings.diagnostic,
    );
    debug!(task = %code, ?indices, "selected chunks");

    let (detective, sample) = prepare_inference(ctx, &training, upload, &company).await?;
    let chunks = blocking(move || {
        indices
            .into_iter()
            .map(|index| {
                let original = sample.chunk(index)?.clone();
                let time_offset = sample.timedelta_for_chunk(index);
                let synthetic = detective.diagnose(&original, time_offset)?;
                Ok(DiagnosticChunk {
                    index,
                    time_offset,
                    original,
                    synthetic,
                })
            })
            .collect::<Result<Vec<_>>>()
    })
    .await?;

    ctx.store
        .save_diagnostic_result(code, DiagnosticResult { chunks })
        .await
}

/// Persisted diagnosis with adjacent chunks joined along the time axis.
pub async fn grouped_diagnostic_result(
    ctx: &PipelineContext,
    code: &TaskCode,
) -> Result<Vec<DiagnosticChunk>> {
    let result = ctx.store.diagnostic_result(code).await?;
    group_adjacent_chunks(result.chunks)
        .iter()
        .map(|group| cumulative_result(group))
        .collect()
}
