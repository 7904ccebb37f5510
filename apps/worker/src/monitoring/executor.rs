use std::sync::Arc;
use tracing::warn;

use super::checker::Checker;
use super::processor::{OutcomeProcessor, ProcessReport};
use super::validation::validate_check;
use crate::store::{CHECKS, RecordStore};

/// Result of one check's pipeline within a cycle
#[derive(Debug)]
pub enum PipelineResult {
    Processed(ProcessReport),
    /// The record could not be read or validated; nothing was probed or written
    Skipped,
}

/// Monitoring executor - runs read → validate → probe → process for one check
pub struct MonitoringExecutor {
    store: Arc<dyn RecordStore>,
    checker: Arc<dyn Checker>,
    processor: Arc<OutcomeProcessor>,
}

impl MonitoringExecutor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        checker: Arc<dyn Checker>,
        processor: Arc<OutcomeProcessor>,
    ) -> Self {
        Self { store, checker, processor }
    }

    /// Execute the full pipeline for the check stored under `check_id`
    pub async fn execute_check(&self, check_id: &str) -> PipelineResult {
        let raw = match self.store.read(CHECKS, check_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(check_id, "error reading check data: {}", e);
                return PipelineResult::Skipped;
            }
        };

        let check = match validate_check(&raw) {
            Ok(check) => check,
            Err(e) => {
                warn!(check_id, "skipping check: {}", e);
                return PipelineResult::Skipped;
            }
        };

        let outcome = self.checker.check(&check).await;
        PipelineResult::Processed(self.processor.process(check, outcome).await)
    }
}
