//! Schema validation for extraction payloads.
//!
//! Turns the provider's textual payload into an `ExtractedBet`, or a
//! `ValidationError` naming the offending field. Pure: no network, no
//! clock — the same input always yields the same result.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{ExtractedBet, Wager};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {0}")]
    NotJson(String),
    #[error("schema violation in `{field}`: {detail}")]
    SchemaViolation { field: String, detail: String },
}

fn violation(field: impl Into<String>, detail: impl Into<String>) -> ValidationError {
    ValidationError::SchemaViolation {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Validate a raw extraction payload against the expected bet schema.
pub fn validate(raw: &str) -> Result<ExtractedBet, ValidationError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| ValidationError::NotJson(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| violation("$", "expected a JSON object"))?;

    let issue_number = match obj.get("issue_number") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err(violation("issue_number", "must not be empty")),
        Some(_) => return Err(violation("issue_number", "must be a string")),
        None => return Err(violation("issue_number", "missing")),
    };

    let entries = match obj.get("wagers") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(violation("wagers", "must be an array")),
        None => return Err(violation("wagers", "missing")),
    };
    if entries.is_empty() {
        return Err(violation("wagers", "must not be empty"));
    }

    let mut wagers = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        wagers.push(validate_wager(entry, i)?);
    }

    Ok(ExtractedBet {
        issue_number,
        wagers,
    })
}

fn validate_wager(entry: &Value, index: usize) -> Result<Wager, ValidationError> {
    let field = |name: &str| format!("wagers[{index}].{name}");

    let obj = entry
        .as_object()
        .ok_or_else(|| violation(format!("wagers[{index}]"), "expected an object"))?;

    let wager_type = match obj.get("type") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err(violation(field("type"), "must not be empty")),
        Some(_) => return Err(violation(field("type"), "must be a string")),
        None => return Err(violation(field("type"), "missing")),
    };

    let raw_numbers = match obj.get("numbers") {
        Some(Value::Array(numbers)) => numbers,
        Some(_) => return Err(violation(field("numbers"), "must be an array")),
        None => return Err(violation(field("numbers"), "missing")),
    };
    if raw_numbers.is_empty() {
        return Err(violation(field("numbers"), "must not be empty"));
    }

    let mut numbers = Vec::with_capacity(raw_numbers.len());
    let mut seen = HashSet::new();
    for number in raw_numbers {
        let s = number
            .as_str()
            .ok_or_else(|| violation(field("numbers"), "entries must be strings"))?;
        if !is_number_token(s) {
            return Err(violation(
                field("numbers"),
                format!("{s:?} does not match one or two digits"),
            ));
        }
        // Declared numbers form a set; "5" and "05" are the same member.
        if !seen.insert(pad2(s)) {
            return Err(violation(field("numbers"), format!("duplicate number {s:?}")));
        }
        numbers.push(s.to_string());
    }

    let amount = parse_amount(obj.get("amount"), &field("amount"))?;

    Ok(Wager {
        wager_type,
        numbers,
        amount,
    })
}

fn parse_amount(value: Option<&Value>, field_name: &str) -> Result<Decimal, ValidationError> {
    let amount = match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|e| violation(field_name, format!("not a decimal: {e}")))?,
        Some(Value::String(s)) => Decimal::from_str(s.trim())
            .map_err(|e| violation(field_name, format!("not a decimal: {e}")))?,
        Some(_) => return Err(violation(field_name, "must be a number or numeric string")),
        None => return Err(violation(field_name, "missing")),
    };
    if amount < Decimal::ZERO {
        return Err(violation(field_name, "must not be negative"));
    }
    Ok(amount)
}

fn is_number_token(s: &str) -> bool {
    !s.is_empty() && s.len() <= 2 && s.chars().all(|c| c.is_ascii_digit())
}

fn pad2(s: &str) -> String {
    if s.len() == 1 {
        format!("0{s}")
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
