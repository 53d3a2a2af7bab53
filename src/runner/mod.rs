//! Job runner — the claim → extract → validate → settle loop.
//!
//! Invoked as a short-lived batch process by an external scheduler.
//! Claims a bounded batch of unclaimed records under a process-wide run
//! lock, drives each record through the pipeline sequentially, and
//! writes exactly one terminal settlement row per record. Per-record
//! failures never abort the batch.

pub mod lock;

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::extract::{BetExtractor, ExtractionFailure};
use crate::settle::SettlementEngine;
use crate::store::Store;
use crate::types::{ProcessingStatus, RawRecord, SettlementRecord};
use crate::validate::{validate, ValidationError};
use lock::RunLock;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why one record's pipeline failed. Becomes the settlement row's
/// error message; never aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("draw not yet published for issue {issue_number}")]
    DrawNotYetPublished { issue_number: String },
}

/// Outcome of one runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The batch ran to completion (possibly with zero eligible records).
    Completed(RunReport),
    /// Another runner holds the lock; nothing was claimed.
    LockHeld,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub claimed: usize,
    pub settled: usize,
    pub errored: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "claimed={} settled={} errored={}",
            self.claimed, self.settled, self.errored,
        )
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct JobRunner {
    store: Store,
    engine: SettlementEngine,
    primary: Box<dyn BetExtractor>,
    fallback: Option<Box<dyn BetExtractor>>,
    batch_size: u32,
    lock_path: PathBuf,
}

impl JobRunner {
    pub fn new(
        store: Store,
        engine: SettlementEngine,
        primary: Box<dyn BetExtractor>,
        fallback: Option<Box<dyn BetExtractor>>,
        batch_size: u32,
        lock_path: PathBuf,
    ) -> Self {
        Self {
            store,
            engine,
            primary,
            fallback,
            batch_size,
            lock_path,
        }
    }

    /// Run one batch. Lock contention is a clean early exit, not an
    /// error; the lock is released on every exit path by the guard.
    pub async fn run(&self) -> Result<RunOutcome> {
        let Some(_lock) = RunLock::try_acquire(&self.lock_path)? else {
            info!(lock = %self.lock_path.display(), "Another runner is active; exiting");
            return Ok(RunOutcome::LockHeld);
        };

        let run_id = Uuid::new_v4();
        let batch = self
            .store
            .claim_batch(self.batch_size)
            .await
            .context("Failed to claim batch")?;

        let mut report = RunReport {
            claimed: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            info!(%run_id, "No unclaimed records");
            return Ok(RunOutcome::Completed(report));
        }

        info!(%run_id, count = batch.len(), "Claimed batch");

        for record in &batch {
            self.store
                .set_status(record.id, ProcessingStatus::Processing)
                .await?;

            let row = self.process_record(record).await?;
            let status = if row.is_valid {
                report.settled += 1;
                ProcessingStatus::Processed
            } else {
                report.errored += 1;
                warn!(
                    record_id = record.id,
                    reason = row.error_message.as_deref().unwrap_or("unknown"),
                    "Record errored",
                );
                ProcessingStatus::Error
            };

            self.store.insert_settlement(&row).await?;
            self.store.set_status(record.id, status).await?;
        }

        info!(%run_id, %report, "Run complete");
        Ok(RunOutcome::Completed(report))
    }

    /// Drive one record through extraction → validation → settlement.
    ///
    /// Pipeline failures are folded into an invalid settlement row;
    /// only store/serialization failures propagate (and abort the run).
    async fn process_record(&self, record: &RawRecord) -> Result<SettlementRecord> {
        let payload = match self.extract_with_failover(&record.body_text).await {
            Ok(payload) => payload,
            Err(failure) => {
                return Ok(SettlementRecord::invalid(
                    record.id,
                    None,
                    None,
                    PipelineError::from(failure).to_string(),
                ));
            }
        };

        let bet = match validate(&payload) {
            Ok(bet) => bet,
            Err(violation) => {
                return Ok(SettlementRecord::invalid(
                    record.id,
                    None,
                    None,
                    PipelineError::from(violation).to_string(),
                ));
            }
        };

        let raw_wagers_json =
            serde_json::to_string(&bet.wagers).context("Failed to serialize wagers")?;

        let Some(draw) = self.store.find_draw(&bet.issue_number).await? else {
            let reason = PipelineError::DrawNotYetPublished {
                issue_number: bet.issue_number.clone(),
            };
            return Ok(SettlementRecord::invalid(
                record.id,
                Some(bet.issue_number),
                Some(raw_wagers_json),
                reason.to_string(),
            ));
        };

        let outcome = self.engine.settle(&bet, &draw);
        let settlement_json =
            serde_json::to_string(&outcome).context("Failed to serialize settlement")?;

        info!(
            record_id = record.id,
            issue_number = %bet.issue_number,
            wagers = outcome.wagers.len(),
            wins = outcome.wins(),
            payout = %outcome.total_payout,
            "Record settled",
        );

        Ok(SettlementRecord::valid(
            record.id,
            bet.issue_number,
            raw_wagers_json,
            settlement_json,
        ))
    }

    /// Call the primary provider; on any `ExtractionFailure`, try the
    /// fallback once. Provider-level failover, not per-request retry.
    async fn extract_with_failover(&self, raw_text: &str) -> Result<String, ExtractionFailure> {
        match self.primary.extract(raw_text).await {
            Ok(payload) => Ok(payload),
            Err(primary_failure) => {
                let Some(fallback) = &self.fallback else {
                    return Err(primary_failure);
                };
                warn!(
                    provider = self.primary.name(),
                    error = %primary_failure,
                    fallback = fallback.name(),
                    "Primary extraction failed; trying fallback",
                );
                fallback.extract(raw_text).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MockBetExtractor;
    use crate::rules::RuleTable;
    use crate::settle::PayoutTable;
    use crate::types::DrawResult;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    const PAYLOAD: &str =
        r#"{"issue_number":"20240601","wagers":[{"type":"direct","numbers":["05"],"amount":10}]}"#;

    fn temp_lock_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tally_test_runner_{}.lock", Uuid::new_v4()));
        p
    }

    fn engine() -> SettlementEngine {
        SettlementEngine::new(
            RuleTable::new(),
            PayoutTable {
                direct: BTreeMap::from([(1, dec!(6.5))]),
                color: dec!(2.8),
                zodiac: dec!(11.5),
            },
        )
    }

    async fn store_with_draw() -> Store {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_draw_result(&DrawResult {
                issue_number: "20240601".into(),
                winning_numbers: vec![
                    "05".into(), "12".into(), "23".into(), "31".into(),
                    "40".into(), "44".into(), "49".into(),
                ],
                draw_time: Utc.with_ymd_and_hms(2024, 6, 1, 21, 30, 0).unwrap(),
            })
            .await
            .unwrap();
        store
    }

    fn ok_extractor(payload: &'static str) -> MockBetExtractor {
        let mut mock = MockBetExtractor::new();
        mock.expect_extract()
            .returning(move |_| Ok(payload.to_string()));
        mock.expect_name().return_const("mock-ok".to_string());
        mock
    }

    fn failing_extractor() -> MockBetExtractor {
        let mut mock = MockBetExtractor::new();
        mock.expect_extract().returning(|_| {
            Err(ExtractionFailure::Provider {
                status: 500,
                detail: "internal error".into(),
            })
        });
        mock.expect_name().return_const("mock-fail".to_string());
        mock
    }

    #[tokio::test]
    async fn test_failover_used_when_primary_fails() {
        let store = store_with_draw().await;
        let id = store.insert_raw_record("body", Utc::now()).await.unwrap();

        let runner = JobRunner::new(
            store.clone(),
            engine(),
            Box::new(failing_extractor()),
            Some(Box::new(ok_extractor(PAYLOAD))),
            8,
            temp_lock_path(),
        );

        let outcome = runner.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(RunReport {
                claimed: 1,
                settled: 1,
                errored: 0,
            }),
        );

        let record = store.get_raw_record(id).await.unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Processed);
    }

    #[tokio::test]
    async fn test_no_fallback_records_provider_error() {
        let store = store_with_draw().await;
        let id = store.insert_raw_record("body", Utc::now()).await.unwrap();

        let runner = JobRunner::new(
            store.clone(),
            engine(),
            Box::new(failing_extractor()),
            None,
            8,
            temp_lock_path(),
        );

        let outcome = runner.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(RunReport {
                claimed: 1,
                settled: 0,
                errored: 1,
            }),
        );

        let settlement = store.settlement_for_record(id).await.unwrap().unwrap();
        assert!(!settlement.is_valid);
        let message = settlement.error_message.unwrap();
        assert!(message.contains("provider error"));
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn test_both_providers_fail_reports_fallback_failure() {
        let store = store_with_draw().await;
        store.insert_raw_record("body", Utc::now()).await.unwrap();

        let mut fallback = MockBetExtractor::new();
        fallback
            .expect_extract()
            .returning(|_| Err(ExtractionFailure::Timeout { seconds: 40 }));
        fallback.expect_name().return_const("mock-slow".to_string());

        let runner = JobRunner::new(
            store.clone(),
            engine(),
            Box::new(failing_extractor()),
            Some(Box::new(fallback)),
            8,
            temp_lock_path(),
        );

        let outcome = runner.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(RunReport {
                claimed: 1,
                settled: 0,
                errored: 1,
            }),
        );
    }

    #[tokio::test]
    async fn test_lock_contention_exits_clean() {
        let store = store_with_draw().await;
        let id = store.insert_raw_record("body", Utc::now()).await.unwrap();

        let lock_path = temp_lock_path();
        let _held = RunLock::try_acquire(&lock_path).unwrap().unwrap();

        let runner = JobRunner::new(
            store.clone(),
            engine(),
            Box::new(ok_extractor(PAYLOAD)),
            None,
            8,
            lock_path,
        );

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::LockHeld);

        // No state mutation: the record is still unclaimed, no settlement.
        let record = store.get_raw_record(id).await.unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Unclaimed);
        assert!(store.settlement_for_record(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let store = Store::in_memory().await.unwrap();
        let runner = JobRunner::new(
            store,
            engine(),
            Box::new(ok_extractor(PAYLOAD)),
            None,
            8,
            temp_lock_path(),
        );

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed(RunReport::default()));
    }

    #[tokio::test]
    async fn test_lock_released_after_run() {
        let store = Store::in_memory().await.unwrap();
        let lock_path = temp_lock_path();
        let runner = JobRunner::new(
            store,
            engine(),
            Box::new(ok_extractor(PAYLOAD)),
            None,
            8,
            lock_path.clone(),
        );

        runner.run().await.unwrap();
        assert!(!lock_path.exists());

        // A subsequent run can re-acquire.
        let outcome = runner.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
    }

    #[test]
    fn test_run_report_display() {
        let report = RunReport {
            claimed: 5,
            settled: 3,
            errored: 2,
        };
        assert_eq!(format!("{report}"), "claimed=5 settled=3 errored=2");
    }
}
