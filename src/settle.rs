//! Settlement engine.
//!
//! Computes win/loss and payout for a validated bet against a published
//! draw. Deterministic and side-effect-free: replaying the same
//! (bet, draw) pair yields a byte-identical outcome, so settlements can
//! be recomputed for audit without a fresh extraction call.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::rules::RuleTable;
use crate::types::{DrawResult, ExtractedBet, SettlementOutcome, Wager, WagerKind, WagerOutcome, WagerResult};

// ---------------------------------------------------------------------------
// Payout table
// ---------------------------------------------------------------------------

/// Payout multipliers. Domain configuration supplied via `config.toml`,
/// never inferred: a matched count absent from the direct table pays zero.
#[derive(Debug, Clone)]
pub struct PayoutTable {
    /// Direct wagers: matched count → multiplier (exact-match table).
    pub direct: BTreeMap<u32, Decimal>,
    /// Flat multiplier for winning color wagers.
    pub color: Decimal,
    /// Flat multiplier for winning zodiac wagers.
    pub zodiac: Decimal,
}

impl PayoutTable {
    pub fn direct_multiplier(&self, matched: usize) -> Decimal {
        self.direct
            .get(&(matched as u32))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    rules: RuleTable,
    payouts: PayoutTable,
}

impl SettlementEngine {
    pub fn new(rules: RuleTable, payouts: PayoutTable) -> Self {
        Self { rules, payouts }
    }

    /// Settle every wager of a bet against a draw.
    ///
    /// Wagers settle independently: an unsupported type or an
    /// out-of-board number invalidates only its own wager. Invalid
    /// wagers are excluded from the aggregate totals.
    pub fn settle(&self, bet: &ExtractedBet, draw: &DrawResult) -> SettlementOutcome {
        let mut wagers = Vec::with_capacity(bet.wagers.len());
        let mut total_staked = Decimal::ZERO;
        let mut total_payout = Decimal::ZERO;

        for wager in &bet.wagers {
            let result = self.settle_wager(wager, draw);
            if !matches!(result, WagerResult::Invalid { .. }) {
                total_staked += wager.amount;
                total_payout += result.payout();
            }
            wagers.push(WagerOutcome {
                wager_type: wager.wager_type.clone(),
                numbers: wager.numbers.clone(),
                amount: wager.amount,
                result,
            });
        }

        SettlementOutcome {
            issue_number: bet.issue_number.clone(),
            wagers,
            total_staked,
            total_payout,
        }
    }

    fn settle_wager(&self, wager: &Wager, draw: &DrawResult) -> WagerResult {
        let kind = match wager.wager_type.parse::<WagerKind>() {
            Ok(kind) => kind,
            Err(_) => {
                return WagerResult::Invalid {
                    reason: format!("unsupported wager type: {}", wager.wager_type),
                }
            }
        };

        let mut numbers = Vec::with_capacity(wager.numbers.len());
        for declared in &wager.numbers {
            match RuleTable::normalize(declared) {
                Ok(normalized) => numbers.push(normalized),
                Err(e) => return WagerResult::Invalid { reason: e.to_string() },
            }
        }

        match kind {
            WagerKind::Direct => self.settle_direct(wager, &numbers, draw),
            WagerKind::Color => self.settle_attribute(wager, &numbers, draw, Attribute::Color),
            WagerKind::Zodiac => self.settle_attribute(wager, &numbers, draw, Attribute::Zodiac),
        }
    }

    /// Direct-number match: wins if any declared number was drawn
    /// (regular or special); the multiplier is keyed by how many matched.
    fn settle_direct(&self, wager: &Wager, numbers: &[String], draw: &DrawResult) -> WagerResult {
        let drawn: Vec<String> = draw
            .winning_numbers
            .iter()
            .filter_map(|n| RuleTable::normalize(n).ok())
            .collect();

        let matched: Vec<String> = numbers
            .iter()
            .filter(|n| drawn.contains(n))
            .cloned()
            .collect();

        if matched.is_empty() {
            return WagerResult::Loss;
        }
        let payout = wager.amount * self.payouts.direct_multiplier(matched.len());
        WagerResult::Win { matched, payout }
    }

    /// Color/zodiac match: wins if every declared number carries the
    /// attribute of the drawn special number.
    fn settle_attribute(
        &self,
        wager: &Wager,
        numbers: &[String],
        draw: &DrawResult,
        attribute: Attribute,
    ) -> WagerResult {
        let Some(special) = draw.special() else {
            return WagerResult::Invalid {
                reason: "draw has no special number".to_string(),
            };
        };

        let (all_match, multiplier) = match attribute {
            Attribute::Color => {
                let target = match self.rules.color_of(special) {
                    Ok(color) => color,
                    Err(e) => {
                        return WagerResult::Invalid {
                            reason: format!("draw special number: {e}"),
                        }
                    }
                };
                let all = numbers
                    .iter()
                    .all(|n| self.rules.color_of(n).map_or(false, |c| c == target));
                (all, self.payouts.color)
            }
            Attribute::Zodiac => {
                let target = match self.rules.zodiac_of(special) {
                    Ok(zodiac) => zodiac,
                    Err(e) => {
                        return WagerResult::Invalid {
                            reason: format!("draw special number: {e}"),
                        }
                    }
                };
                let all = numbers
                    .iter()
                    .all(|n| self.rules.zodiac_of(n).map_or(false, |z| z == target));
                (all, self.payouts.zodiac)
            }
        };

        if all_match {
            WagerResult::Win {
                matched: numbers.to_vec(),
                payout: wager.amount * multiplier,
            }
        } else {
            WagerResult::Loss
        }
    }
}

enum Attribute {
    Color,
    Zodiac,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
