//! Human-readable byte counts
//!
//! Sizes are shown in binary units (1 KB = 1024 B) with one decimal.

const UNIT: f64 = 1024.0;

/// Format a byte count as `B`, `KB`, `MB` or `GB`
///
/// # Examples
///
/// ```
/// use photosync_common::human_size::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(120645), "117.8 KB");
/// assert_eq!(format_bytes(2_000_000), "1.9 MB");
/// ```
pub fn format_bytes(size: i64) -> String {
    let abs = size.unsigned_abs() as f64;
    let sign = if size < 0 { "-" } else { "" };

    if abs < UNIT {
        format!("{}{} B", sign, abs as u64)
    } else if abs < UNIT * UNIT {
        format!("{}{:.1} KB", sign, abs / UNIT)
    } else if abs < UNIT * UNIT * UNIT {
        format!("{}{:.1} MB", sign, abs / (UNIT * UNIT))
    } else {
        format!("{}{:.1} GB", sign, abs / (UNIT * UNIT * UNIT))
    }
}
