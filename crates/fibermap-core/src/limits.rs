//! Scan guards and environment overrides for extraction runs.

/// Highest row a worksheet can hold; the row walker never goes past it.
pub const MAX_SCAN_ROWS: u32 = 1_048_576;

/// Smallest accepted scan ceiling when overridden from the environment.
pub const MIN_SCAN_ROWS: u32 = 1;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

/// Row ceiling for the walker, overridable with `FIBERMAP_MAX_SCAN_ROWS`.
pub fn max_scan_rows() -> u32 {
    match std::env::var("FIBERMAP_MAX_SCAN_ROWS") {
        Ok(val) => match val.trim().parse::<i64>() {
            Ok(n) => clamp_int(n, MIN_SCAN_ROWS as i64, MAX_SCAN_ROWS as i64) as u32,
            Err(_) => MAX_SCAN_ROWS,
        },
        Err(_) => MAX_SCAN_ROWS,
    }
}

/// When enabled, the first row of a duplicated fiber id is kept instead of
/// the last one.
pub fn strict_duplicates_enabled() -> bool {
    match std::env::var("FIBERMAP_STRICT_DUPLICATES") {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            matches!(v.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => false,
    }
}
