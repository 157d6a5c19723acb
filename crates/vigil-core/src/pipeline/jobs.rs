//! Job payloads for the three stages and the handlers that run them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{PipelineContext, detection, diagnostic, training};
use crate::domain::TaskCode;
use crate::error::Result;
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainJob {
    pub code: TaskCode,
}

impl Task for TrainJob {
    const TYPE: &'static str = "vigil.pipeline.train.v1";

    fn dedupe_key(&self) -> String {
        format!("train:{}", self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectJob {
    pub code: TaskCode,
}

impl Task for DetectJob {
    const TYPE: &'static str = "vigil.pipeline.detect.v1";

    fn dedupe_key(&self) -> String {
        format!("detect:{}", self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnoseJob {
    pub code: TaskCode,
}

impl Task for DiagnoseJob {
    const TYPE: &'static str = "vigil.pipeline.diagnose.v1";

    fn dedupe_key(&self) -> String {
        format!("diagnose:{}", self.code)
    }
}

pub const PIPELINE_TASK_TYPES: [&str; 3] = [TrainJob::TYPE, DetectJob::TYPE, DiagnoseJob::TYPE];

pub struct TrainHandler {
    ctx: PipelineContext,
}

impl TrainHandler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Handler<TrainJob> for TrainHandler {
    async fn handle(&self, job: TrainJob) -> Result<()> {
        training::run_training(&self.ctx, &job.code).await
    }
}

pub struct DetectHandler {
    ctx: PipelineContext,
}

impl DetectHandler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Handler<DetectJob> for DetectHandler {
    async fn handle(&self, job: DetectJob) -> Result<()> {
        detection::run_detection(&self.ctx, &job.code).await
    }
}

pub struct DiagnoseHandler {
    ctx: PipelineContext,
}

impl DiagnoseHandler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Handler<DiagnoseJob> for DiagnoseHandler {
    async fn handle(&self, job: DiagnoseJob) -> Result<()> {
        diagnostic::run_diagnostic(&self.ctx, &job.code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keys_differ_per_stage() {
        let code = TaskCode::new("01HX");
        let keys = [
            TrainJob { code: code.clone() }.dedupe_key(),
            DetectJob { code: code.clone() }.dedupe_key(),
            DiagnoseJob { code }.dedupe_key(),
        ];
        assert_eq!(keys, ["train:01HX", "detect:01HX", "diagnose:01HX"]);
    }

    #[test]
    fn envelope_payload_is_the_code() {
        let envelope = DetectJob {
            code: TaskCode::new("abc"),
        }
        .envelope()
        .unwrap();
        assert_eq!(envelope.task_type, DetectJob::TYPE);
        assert_eq!(envelope.payload, serde_json::json!({"code": "abc"}));
    }
}
