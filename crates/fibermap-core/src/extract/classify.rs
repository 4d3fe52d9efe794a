//! Row classification and identifier decoding.
//!
//! Pure functions only: every decision here is made from the literal row
//! values, so each rule can be exercised without a sheet.

use serde::{Deserialize, Serialize};

use crate::models::{
    CabinetPath, ParsedRow, RawRow, SpliceUnitKey, SpliceUnitKind, NOT_SET, PBI_PREFIX, PBO_PREFIX,
};

/// Minimum number of `-` separated segments in a cabinet code:
/// site, cabinet, a literal separator token, module.
const CABINET_CODE_MIN_SEGMENTS: usize = 4;

/// Why a row was skipped. Discards are expected and never reported as errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscardReason {
    MissingRequiredField,
    UnrecognizedSplicePrefix,
    MalformedCabinetCode,
    NonNumericFiberNumber,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::MissingRequiredField => "missing-required-field",
            DiscardReason::UnrecognizedSplicePrefix => "unrecognized-splice-prefix",
            DiscardReason::MalformedCabinetCode => "malformed-cabinet-code",
            DiscardReason::NonNumericFiberNumber => "non-numeric-fiber-number",
        }
    }
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_missing(value: &str) -> bool {
    value == NOT_SET || value.trim().is_empty()
}

/// `"PBO-…-7"` -> `7` (PBO); `"BE-…"` -> the whole value (PBI).
///
/// The PBO id is whatever follows the last hyphen, even when that is empty.
pub fn decode_splice_unit(raw: &str) -> Option<SpliceUnitKey> {
    let raw = raw.trim();
    if raw.starts_with(PBO_PREFIX) {
        let id = raw.rsplit('-').next().unwrap_or_default();
        Some(SpliceUnitKey {
            id: id.to_string(),
            kind: SpliceUnitKind::Pbo,
        })
    } else if raw.starts_with(PBI_PREFIX) {
        Some(SpliceUnitKey {
            id: raw.to_string(),
            kind: SpliceUnitKind::Pbi,
        })
    } else {
        None
    }
}

/// `"B2-T1-MODULE-A"` -> site `B2`, cabinet `T1`, module `A`. The third
/// segment is ignored. Only the segment count is checked; empty segments
/// decode to empty ids.
pub fn decode_cabinet_path(code: &str) -> Option<CabinetPath> {
    let segments: Vec<&str> = code.trim().split('-').collect();
    if segments.len() < CABINET_CODE_MIN_SEGMENTS {
        return None;
    }
    let (site, cabinet, module) = (segments[0], segments[1], segments[3]);
    Some(CabinetPath {
        site_code: site.to_string(),
        cabinet_id: cabinet.to_string(),
        module_id: module.to_string(),
    })
}

/// Positive whole number. Numeric cells may arrive as `"3.0"`.
pub fn parse_fiber_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let number = match raw.parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            let f = raw.parse::<f64>().ok()?;
            if !f.is_finite() || f.fract() != 0.0 || f < 1.0 || f > u32::MAX as f64 {
                return None;
            }
            f as u32
        }
    };
    (number > 0).then_some(number)
}

/// Decide whether a raw row is usable and decode its identifiers.
pub fn classify(raw: &RawRow) -> Result<ParsedRow, DiscardReason> {
    if is_missing(&raw.splice_unit_raw)
        || is_missing(&raw.cabinet_code)
        || is_missing(&raw.fiber_number_raw)
    {
        return Err(DiscardReason::MissingRequiredField);
    }
    let splice_unit =
        decode_splice_unit(&raw.splice_unit_raw).ok_or(DiscardReason::UnrecognizedSplicePrefix)?;
    let cabinet =
        decode_cabinet_path(&raw.cabinet_code).ok_or(DiscardReason::MalformedCabinetCode)?;
    let fiber_number =
        parse_fiber_number(&raw.fiber_number_raw).ok_or(DiscardReason::NonNumericFiberNumber)?;

    Ok(ParsedRow {
        row_index: raw.row_index,
        splice_unit,
        cabinet,
        fiber_number,
        legacy_status: raw.legacy_status.clone(),
        legacy_distance: raw.legacy_distance.clone(),
    })
}
