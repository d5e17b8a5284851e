//! Input validation utilities.
//!
//! These checks run before any lock is taken so that malformed requests fail fast and never
//! block behind a busy bed.

use crate::constants::{MAX_BULK_BEDS, MAX_PAGE_LIMIT};
use crate::{IpdError, IpdResult};

/// Validates a bed's daily rate in minor currency units.
pub fn validate_daily_rate(daily_rate_cents: i64) -> IpdResult<()> {
    if daily_rate_cents < 0 {
        return Err(IpdError::InvalidInput(
            "daily rate cannot be negative".into(),
        ));
    }
    Ok(())
}

/// Validates the number of beds requested by a bulk creation.
pub fn validate_bulk_count(count: u32) -> IpdResult<()> {
    if count == 0 {
        return Err(IpdError::InvalidInput(
            "bulk bed count must be at least 1".into(),
        ));
    }
    if count > MAX_BULK_BEDS {
        return Err(IpdError::InvalidInput(format!(
            "bulk bed count exceeds maximum of {}",
            MAX_BULK_BEDS
        )));
    }
    Ok(())
}

/// Validates a bed number prefix used by bulk creation (for example `A-` giving `A-01`).
///
/// The prefix is free text, but control characters would end up in printed wristbands and
/// bed boards, so they are refused.
pub fn validate_bed_prefix(prefix: &str) -> IpdResult<()> {
    const MAX_PREFIX_LEN: usize = 16;

    if prefix.chars().count() > MAX_PREFIX_LEN {
        return Err(IpdError::InvalidInput(format!(
            "bed prefix exceeds maximum length of {} characters",
            MAX_PREFIX_LEN
        )));
    }
    if prefix.chars().any(char::is_control) {
        return Err(IpdError::InvalidInput(
            "bed prefix contains control characters".into(),
        ));
    }
    Ok(())
}

/// Validates listing pagination (1-based page).
pub fn validate_page(page: u32, limit: u32) -> IpdResult<()> {
    if page == 0 {
        return Err(IpdError::InvalidInput("page starts at 1".into()));
    }
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(IpdError::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }
    Ok(())
}
