//! Persistence layer.
//!
//! SQLite-backed storage for raw records, draw results, and settlement
//! records. The schema is initialized at connect time; all writes are
//! single-row statements, so no cross-row transaction coordination is
//! needed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{DrawResult, ProcessingStatus, RawRecord, SettlementRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_records (
    id                INTEGER PRIMARY KEY,
    body_text         TEXT NOT NULL,
    received_at       TEXT NOT NULL,
    processing_status TEXT NOT NULL DEFAULT 'unclaimed'
);

CREATE TABLE IF NOT EXISTS draw_results (
    issue_number    TEXT PRIMARY KEY,
    winning_numbers TEXT NOT NULL,
    draw_time       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settlement_records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id       INTEGER NOT NULL UNIQUE REFERENCES raw_records(id),
    issue_number    TEXT,
    raw_wagers_json TEXT,
    is_valid        INTEGER NOT NULL,
    error_message   TEXT,
    settlement_json TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_records_status
    ON raw_records (processing_status, received_at);
CREATE INDEX IF NOT EXISTS idx_settlement_issue
    ON settlement_records (issue_number);
"#;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct RawRecordRow {
    id: i64,
    body_text: String,
    received_at: DateTime<Utc>,
    processing_status: String,
}

impl RawRecordRow {
    fn into_record(self) -> Result<RawRecord> {
        let status: ProcessingStatus = self
            .processing_status
            .parse()
            .with_context(|| format!("Corrupt status on record {}", self.id))?;
        Ok(RawRecord {
            id: self.id,
            body_text: self.body_text,
            received_at: self.received_at,
            processing_status: status,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DrawResultRow {
    issue_number: String,
    winning_numbers: String,
    draw_time: DateTime<Utc>,
}

impl DrawResultRow {
    fn into_draw(self) -> Result<DrawResult> {
        let winning_numbers: Vec<String> = serde_json::from_str(&self.winning_numbers)
            .with_context(|| format!("Corrupt winning numbers for issue {}", self.issue_number))?;
        Ok(DrawResult {
            issue_number: self.issue_number,
            winning_numbers,
            draw_time: self.draw_time,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SettlementRecordRow {
    record_id: i64,
    issue_number: Option<String>,
    raw_wagers_json: Option<String>,
    is_valid: bool,
    error_message: Option<String>,
    settlement_json: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SettlementRecordRow> for SettlementRecord {
    fn from(row: SettlementRecordRow) -> Self {
        SettlementRecord {
            record_id: row.record_id,
            issue_number: row.issue_number,
            raw_wagers_json: row.raw_wagers_json,
            is_valid: row.is_valid,
            error_message: row.error_message,
            settlement_json: row.settlement_json,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database and initialize the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {database_url}"))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to initialize schema")?;

        info!(database_url, "Store ready");
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single pooled connection keeps the
    /// database alive for the store's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to initialize schema")?;

        Ok(Self { pool })
    }

    // -- Ingestion boundary ----------------------------------------------

    /// Insert an inbound notification. Called by the external webhook
    /// receiver (and tests); the runner never originates records.
    pub async fn insert_raw_record(
        &self,
        body_text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO raw_records (body_text, received_at, processing_status) \
             VALUES (?, ?, 'unclaimed')",
        )
        .bind(body_text)
        .bind(received_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert raw record")?;

        Ok(result.last_insert_rowid())
    }

    // -- Runner queries ---------------------------------------------------

    /// Select up to `limit` unclaimed records, oldest first. Called once
    /// per run, under the run lock, before any extraction call.
    pub async fn claim_batch(&self, limit: u32) -> Result<Vec<RawRecord>> {
        let rows: Vec<RawRecordRow> = sqlx::query_as(
            "SELECT id, body_text, received_at, processing_status \
             FROM raw_records \
             WHERE processing_status = 'unclaimed' \
             ORDER BY received_at ASC, id ASC \
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to select unclaimed records")?;

        rows.into_iter().map(RawRecordRow::into_record).collect()
    }

    /// Advance a record's processing status.
    pub async fn set_status(&self, record_id: i64, status: ProcessingStatus) -> Result<()> {
        sqlx::query("UPDATE raw_records SET processing_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(record_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to set status on record {record_id}"))?;

        debug!(record_id, status = %status, "Status updated");
        Ok(())
    }

    pub async fn get_raw_record(&self, record_id: i64) -> Result<Option<RawRecord>> {
        let row: Option<RawRecordRow> = sqlx::query_as(
            "SELECT id, body_text, received_at, processing_status \
             FROM raw_records WHERE id = ?",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch raw record")?;

        row.map(RawRecordRow::into_record).transpose()
    }

    /// Records per status, for operational visibility.
    pub async fn count_by_status(&self, status: ProcessingStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM raw_records WHERE processing_status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .context("Failed to count records")?;
        Ok(count)
    }

    // -- Draw-result boundary ---------------------------------------------

    /// Publish a draw result. Draws are immutable: re-publishing an
    /// existing issue is a no-op.
    pub async fn upsert_draw_result(&self, draw: &DrawResult) -> Result<()> {
        let winning_numbers = serde_json::to_string(&draw.winning_numbers)
            .context("Failed to serialize winning numbers")?;

        sqlx::query(
            "INSERT INTO draw_results (issue_number, winning_numbers, draw_time) \
             VALUES (?, ?, ?) \
             ON CONFLICT(issue_number) DO NOTHING",
        )
        .bind(&draw.issue_number)
        .bind(winning_numbers)
        .bind(draw.draw_time)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert draw {}", draw.issue_number))?;

        Ok(())
    }

    pub async fn find_draw(&self, issue_number: &str) -> Result<Option<DrawResult>> {
        let row: Option<DrawResultRow> = sqlx::query_as(
            "SELECT issue_number, winning_numbers, draw_time \
             FROM draw_results WHERE issue_number = ?",
        )
        .bind(issue_number)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up draw {issue_number}"))?;

        row.map(DrawResultRow::into_draw).transpose()
    }

    // -- Settlement records -----------------------------------------------

    /// Insert the settlement row for a record.
    ///
    /// At most one settlement exists per record. An earlier error row may
    /// be superseded (the record was externally reset and reprocessed); a
    /// valid settlement is final and a second write is rejected.
    pub async fn insert_settlement(&self, record: &SettlementRecord) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO settlement_records \
             (record_id, issue_number, raw_wagers_json, is_valid, error_message, \
              settlement_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(record_id) DO UPDATE SET \
                issue_number = excluded.issue_number, \
                raw_wagers_json = excluded.raw_wagers_json, \
                is_valid = excluded.is_valid, \
                error_message = excluded.error_message, \
                settlement_json = excluded.settlement_json, \
                created_at = excluded.created_at \
             WHERE settlement_records.is_valid = 0",
        )
        .bind(record.record_id)
        .bind(&record.issue_number)
        .bind(&record.raw_wagers_json)
        .bind(record.is_valid)
        .bind(&record.error_message)
        .bind(&record.settlement_json)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert settlement for record {}", record.record_id))?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "settlement already recorded for record {}",
                record.record_id
            );
        }
        Ok(())
    }

    // -- Downstream lookups (reporting / notification adapters) -----------

    pub async fn settlement_for_record(&self, record_id: i64) -> Result<Option<SettlementRecord>> {
        let row: Option<SettlementRecordRow> = sqlx::query_as(
            "SELECT record_id, issue_number, raw_wagers_json, is_valid, \
                    error_message, settlement_json, created_at \
             FROM settlement_records WHERE record_id = ?",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch settlement")?;

        Ok(row.map(SettlementRecord::from))
    }

    pub async fn settlements_for_issue(&self, issue_number: &str) -> Result<Vec<SettlementRecord>> {
        let rows: Vec<SettlementRecordRow> = sqlx::query_as(
            "SELECT record_id, issue_number, raw_wagers_json, is_valid, \
                    error_message, settlement_json, created_at \
             FROM settlement_records WHERE issue_number = ? \
             ORDER BY record_id ASC",
        )
        .bind(issue_number)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch settlements by issue")?;

        Ok(rows.into_iter().map(SettlementRecord::from).collect())
    }

    pub async fn valid_settlements(&self) -> Result<Vec<SettlementRecord>> {
        let rows: Vec<SettlementRecordRow> = sqlx::query_as(
            "SELECT record_id, issue_number, raw_wagers_json, is_valid, \
                    error_message, settlement_json, created_at \
             FROM settlement_records WHERE is_valid = 1 \
             ORDER BY record_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch valid settlements")?;

        Ok(rows.into_iter().map(SettlementRecord::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
