//! Input filtering for node parameter edits.

use thiserror::Error;

/// Parameter keys that only accept digits and a single decimal point.
pub const NUMERIC_FIELDS: [&str; 10] =
    ["value", "stopLoss", "takeProfit", "period", "fast", "slow", "signal", "std_dev", "k", "d"];

/// The edit was refused; the field keeps its previous value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{field}' accepts digits and at most one decimal point")]
pub struct Rejected {
    pub field: String,
}

pub fn is_numeric_field(field: &str) -> bool {
    NUMERIC_FIELDS.contains(&field)
}

/// Filter a raw edit for `field`.
///
/// Numeric fields drop every character that is not an ASCII digit or `.`.
/// A result with more than one `.` is rejected. Other fields pass through.
pub fn sanitize(field: &str, raw: &str) -> Result<String, Rejected> {
    if !is_numeric_field(field) {
        return Ok(raw.to_string());
    }

    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    if cleaned.matches('.').count() > 1 {
        return Err(Rejected { field: field.to_string() });
    }
    Ok(cleaned)
}
