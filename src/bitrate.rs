use crate::error::{CompressorError, Result};

const BITS_PER_MEGABYTE: f64 = 1024.0 * 1024.0 * 8.0;

/// Average bitrate (kbps) that fits `size_budget_mb` into `duration_seconds`.
///
/// Assumes constant bitrate and ignores container overhead, so the encoded
/// file can land slightly above the budget.
pub fn bitrate_kbps(size_budget_mb: u64, duration_seconds: f64) -> Result<f64> {
    if size_budget_mb == 0 {
        return Err(CompressorError::InvalidInput(String::from("size budget must be greater than 0 MB.")));
    }
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(CompressorError::InvalidInput(format!("duration must be a positive number of seconds, got {duration_seconds}.")));
    }
    Ok((size_budget_mb as f64) * BITS_PER_MEGABYTE / duration_seconds / 1024.0)
}

/// Whole kbps value handed to the encoder. Rounds down so the budget is never
/// exceeded by rounding, but never goes below 1.
pub fn encoder_kbps(bitrate_kbps: f64) -> u64 {
    (bitrate_kbps.floor() as u64).max(1)
}
