//! Shared types for the TALLY pipeline.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that extraction, settlement,
//! store, and runner modules can depend on them without circular
//! references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// Lifecycle status of an inbound notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Unclaimed,
    Processing,
    Processed,
    Error,
}

impl ProcessingStatus {
    /// All statuses (useful for iteration).
    pub const ALL: &'static [ProcessingStatus] = &[
        ProcessingStatus::Unclaimed,
        ProcessingStatus::Processing,
        ProcessingStatus::Processed,
        ProcessingStatus::Error,
    ];

    /// Stable string form used in the database column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Unclaimed => "unclaimed",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Error => "error",
        }
    }

    /// Whether this status is terminal for the runner.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Processed | ProcessingStatus::Error)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclaimed" => Ok(ProcessingStatus::Unclaimed),
            "processing" => Ok(ProcessingStatus::Processing),
            "processed" => Ok(ProcessingStatus::Processed),
            "error" => Ok(ProcessingStatus::Error),
            _ => Err(anyhow::anyhow!("Unknown processing status: {s}")),
        }
    }
}

/// An inbound wager notification as persisted by the ingestion adapter.
///
/// Created by the external webhook receiver; the runner only reads the
/// body and advances the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
}

impl fmt::Display for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] received {} ({} chars)",
            self.id,
            self.processing_status,
            self.received_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.body_text.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Extracted bets
// ---------------------------------------------------------------------------

/// Structured bet data produced by extraction + validation for one record.
///
/// Transient: held in memory during a single processing attempt and
/// persisted as an audit JSON blob on the settlement row, never re-parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBet {
    pub issue_number: String,
    pub wagers: Vec<Wager>,
}

/// A single declared stake: one wager type, a set of numbers, an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    #[serde(rename = "type")]
    pub wager_type: String,
    pub numbers: Vec<String>,
    pub amount: Decimal,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] @ {}",
            self.wager_type,
            self.numbers.join(","),
            self.amount,
        )
    }
}

/// Supported wager-type semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerKind {
    /// Wins if any declared number is among the drawn numbers.
    Direct,
    /// Wins if every declared number shares the special number's color.
    Color,
    /// Wins if every declared number shares the special number's zodiac.
    Zodiac,
}

impl fmt::Display for WagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerKind::Direct => write!(f, "direct"),
            WagerKind::Color => write!(f, "color"),
            WagerKind::Zodiac => write!(f, "zodiac"),
        }
    }
}

impl std::str::FromStr for WagerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "number" => Ok(WagerKind::Direct),
            "color" | "colour" | "wave" => Ok(WagerKind::Color),
            "zodiac" => Ok(WagerKind::Zodiac),
            _ => Err(anyhow::anyhow!("Unknown wager type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Draw results
// ---------------------------------------------------------------------------

/// A published lottery draw: 6 regular numbers plus 1 special, in draw
/// order with the special number last. Immutable once published; owned
/// by the external results feed and read-only to this pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawResult {
    pub issue_number: String,
    pub winning_numbers: Vec<String>,
    pub draw_time: DateTime<Utc>,
}

impl DrawResult {
    /// The regular numbers (everything before the special).
    pub fn regular(&self) -> &[String] {
        match self.winning_numbers.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// The special number, drawn last.
    pub fn special(&self) -> Option<&str> {
        self.winning_numbers.last().map(String::as_str)
    }
}

impl fmt::Display for DrawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "issue {} [{}] drawn {}",
            self.issue_number,
            self.winning_numbers.join(" "),
            self.draw_time.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement outcomes
// ---------------------------------------------------------------------------

/// Per-wager settlement result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WagerResult {
    Win { matched: Vec<String>, payout: Decimal },
    Loss,
    /// The wager could not be settled (unsupported type, number outside
    /// the board). Does not invalidate sibling wagers.
    Invalid { reason: String },
}

impl WagerResult {
    pub fn is_win(&self) -> bool {
        matches!(self, WagerResult::Win { .. })
    }

    pub fn payout(&self) -> Decimal {
        match self {
            WagerResult::Win { payout, .. } => *payout,
            _ => Decimal::ZERO,
        }
    }
}

/// One wager as settled, preserving the declared stake for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerOutcome {
    pub wager_type: String,
    pub numbers: Vec<String>,
    pub amount: Decimal,
    #[serde(flatten)]
    pub result: WagerResult,
}

/// The full settlement of one bet against one draw. Deterministic:
/// replaying the same (bet, draw) pair yields a byte-identical
/// serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub issue_number: String,
    pub wagers: Vec<WagerOutcome>,
    /// Sum of stakes over wagers that settled (wins and losses).
    pub total_staked: Decimal,
    /// Sum of payouts over winning wagers.
    pub total_payout: Decimal,
}

impl SettlementOutcome {
    /// Net result for the bettor (payout minus stake).
    pub fn net(&self) -> Decimal {
        self.total_payout - self.total_staked
    }

    /// Number of winning wagers.
    pub fn wins(&self) -> usize {
        self.wagers.iter().filter(|w| w.result.is_win()).count()
    }
}

impl fmt::Display for SettlementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "issue {}: {} wagers, {} won | staked={} payout={} net={}",
            self.issue_number,
            self.wagers.len(),
            self.wins(),
            self.total_staked,
            self.total_payout,
            self.net(),
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement records
// ---------------------------------------------------------------------------

/// The durable settlement row: exactly one per raw record.
///
/// Invariant: `is_valid == true` ⇔ `error_message` is `None` and
/// `settlement_json` is `Some`. The constructors below are the only way
/// the runner builds these, so the invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub record_id: i64,
    pub issue_number: Option<String>,
    pub raw_wagers_json: Option<String>,
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub settlement_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// A successfully settled record.
    pub fn valid(
        record_id: i64,
        issue_number: String,
        raw_wagers_json: String,
        settlement_json: String,
    ) -> Self {
        Self {
            record_id,
            issue_number: Some(issue_number),
            raw_wagers_json: Some(raw_wagers_json),
            is_valid: true,
            error_message: None,
            settlement_json: Some(settlement_json),
            created_at: Utc::now(),
        }
    }

    /// A record that failed at some pipeline stage. The issue number and
    /// raw wagers are kept when the failure happened after validation.
    pub fn invalid(
        record_id: i64,
        issue_number: Option<String>,
        raw_wagers_json: Option<String>,
        error_message: String,
    ) -> Self {
        Self {
            record_id,
            issue_number,
            raw_wagers_json,
            is_valid: false,
            error_message: Some(error_message),
            settlement_json: None,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for SettlementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(
                f,
                "record {} settled (issue {})",
                self.record_id,
                self.issue_number.as_deref().unwrap_or("?"),
            )
        } else {
            write!(
                f,
                "record {} errored: {}",
                self.record_id,
                self.error_message.as_deref().unwrap_or("unknown"),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- ProcessingStatus tests --

    #[test]
    fn test_status_as_str_roundtrip() {
        for status in ProcessingStatus::ALL {
            let parsed: ProcessingStatus = status.as_str().parse().unwrap();
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn test_status_from_str_unknown() {
        assert!("pending".parse::<ProcessingStatus>().is_err());
        assert!("".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(!ProcessingStatus::Unclaimed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
        assert!(ProcessingStatus::Processed.is_terminal());
        assert!(ProcessingStatus::Error.is_terminal());
    }

    // -- WagerKind tests --

    #[test]
    fn test_wager_kind_from_str() {
        assert_eq!("direct".parse::<WagerKind>().unwrap(), WagerKind::Direct);
        assert_eq!("COLOR".parse::<WagerKind>().unwrap(), WagerKind::Color);
        assert_eq!("colour".parse::<WagerKind>().unwrap(), WagerKind::Color);
        assert_eq!(" zodiac ".parse::<WagerKind>().unwrap(), WagerKind::Zodiac);
        assert!("parlay".parse::<WagerKind>().is_err());
    }

    // -- DrawResult tests --

    fn sample_draw() -> DrawResult {
        DrawResult {
            issue_number: "20240601".to_string(),
            winning_numbers: vec![
                "05".into(), "12".into(), "23".into(), "31".into(),
                "40".into(), "44".into(), "49".into(),
            ],
            draw_time: Utc::now(),
        }
    }

    #[test]
    fn test_draw_regular_and_special() {
        let draw = sample_draw();
        assert_eq!(draw.regular().len(), 6);
        assert_eq!(draw.special(), Some("49"));
        assert!(!draw.regular().contains(&"49".to_string()));
    }

    #[test]
    fn test_draw_empty_numbers() {
        let draw = DrawResult {
            issue_number: "x".into(),
            winning_numbers: Vec::new(),
            draw_time: Utc::now(),
        };
        assert!(draw.regular().is_empty());
        assert_eq!(draw.special(), None);
    }

    // -- WagerResult tests --

    #[test]
    fn test_wager_result_payout() {
        let win = WagerResult::Win {
            matched: vec!["05".into()],
            payout: dec!(65),
        };
        assert!(win.is_win());
        assert_eq!(win.payout(), dec!(65));
        assert_eq!(WagerResult::Loss.payout(), Decimal::ZERO);
        assert_eq!(
            WagerResult::Invalid { reason: "x".into() }.payout(),
            Decimal::ZERO,
        );
    }

    #[test]
    fn test_wager_result_audit_shape() {
        // The audit JSON is consumed by downstream reporting; the tag and
        // string-encoded decimals are part of the contract.
        let outcome = WagerOutcome {
            wager_type: "direct".into(),
            numbers: vec!["05".into()],
            amount: dec!(10),
            result: WagerResult::Win {
                matched: vec!["05".into()],
                payout: dec!(65),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "win");
        assert_eq!(json["amount"], "10");
        assert_eq!(json["payout"], "65");
    }

    // -- SettlementOutcome tests --

    #[test]
    fn test_settlement_outcome_net() {
        let outcome = SettlementOutcome {
            issue_number: "20240601".into(),
            wagers: vec![
                WagerOutcome {
                    wager_type: "direct".into(),
                    numbers: vec!["05".into()],
                    amount: dec!(10),
                    result: WagerResult::Win {
                        matched: vec!["05".into()],
                        payout: dec!(65),
                    },
                },
                WagerOutcome {
                    wager_type: "color".into(),
                    numbers: vec!["01".into()],
                    amount: dec!(5),
                    result: WagerResult::Loss,
                },
            ],
            total_staked: dec!(15),
            total_payout: dec!(65),
        };
        assert_eq!(outcome.net(), dec!(50));
        assert_eq!(outcome.wins(), 1);
    }

    // -- SettlementRecord tests --

    #[test]
    fn test_settlement_record_valid_invariant() {
        let rec = SettlementRecord::valid(
            7,
            "20240601".into(),
            "[]".into(),
            "{}".into(),
        );
        assert!(rec.is_valid);
        assert!(rec.error_message.is_none());
        assert!(rec.settlement_json.is_some());
    }

    #[test]
    fn test_settlement_record_invalid_invariant() {
        let rec = SettlementRecord::invalid(7, None, None, "boom".into());
        assert!(!rec.is_valid);
        assert_eq!(rec.error_message.as_deref(), Some("boom"));
        assert!(rec.settlement_json.is_none());
    }

    #[test]
    fn test_settlement_record_display() {
        let ok = SettlementRecord::valid(1, "i".into(), "[]".into(), "{}".into());
        assert!(format!("{ok}").contains("settled"));
        let bad = SettlementRecord::invalid(2, None, None, "no draw".into());
        assert!(format!("{bad}").contains("no draw"));
    }
}
