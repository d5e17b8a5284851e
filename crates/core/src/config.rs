//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as an
//! `Arc<CoreConfig>`. Nothing in this crate reads environment variables; binaries read them and
//! hand the raw values to the `*_from_env_value` helpers below.

use crate::constants::{
    DEFAULT_ADMISSION_PREFIX, DEFAULT_LOCK_WAIT_TIMEOUT_MS, DEFAULT_POOL_SIZE,
    MAX_LOCK_WAIT_TIMEOUT_MS,
};
use crate::{IpdError, IpdResult};
use chrono::FixedOffset;
use ipd_types::SequencePrefix;
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    lock_wait_timeout: Duration,
    admission_prefix: SequencePrefix,
    business_day_offset: FixedOffset,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`IpdError::InvalidInput`] if `lock_wait_timeout` is zero or longer than
    /// [`MAX_LOCK_WAIT_TIMEOUT_MS`].
    pub fn new(
        lock_wait_timeout: Duration,
        admission_prefix: SequencePrefix,
        business_day_offset: FixedOffset,
    ) -> IpdResult<Self> {
        if lock_wait_timeout.is_zero() {
            return Err(IpdError::InvalidInput(
                "lock wait timeout must be greater than zero".into(),
            ));
        }
        if lock_wait_timeout > Duration::from_millis(MAX_LOCK_WAIT_TIMEOUT_MS) {
            return Err(IpdError::InvalidInput(format!(
                "lock wait timeout must not exceed {} ms",
                MAX_LOCK_WAIT_TIMEOUT_MS
            )));
        }

        Ok(Self {
            lock_wait_timeout,
            admission_prefix,
            business_day_offset,
        })
    }

    /// How long a transaction waits for a row lock before the operation fails with `Busy`.
    pub fn lock_wait_timeout(&self) -> Duration {
        self.lock_wait_timeout
    }

    pub fn admission_prefix(&self) -> &SequencePrefix {
        &self.admission_prefix
    }

    /// UTC offset of the facility's business day, used to date-scope reference numbers.
    pub fn business_day_offset(&self) -> FixedOffset {
        self.business_day_offset
    }
}

/// Parse the lock wait timeout (milliseconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_LOCK_WAIT_TIMEOUT_MS`].
pub fn lock_wait_timeout_from_env_value(value: Option<String>) -> IpdResult<Duration> {
    let Some(value) = non_blank(value) else {
        return Ok(Duration::from_millis(DEFAULT_LOCK_WAIT_TIMEOUT_MS));
    };
    let millis = value.parse::<u64>().map_err(|_| {
        IpdError::InvalidInput(format!(
            "lock wait timeout must be a whole number of milliseconds, got '{}'",
            value
        ))
    })?;
    Ok(Duration::from_millis(millis))
}

/// Parse the admission number prefix from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_ADMISSION_PREFIX`].
pub fn admission_prefix_from_env_value(value: Option<String>) -> IpdResult<SequencePrefix> {
    let value = non_blank(value).unwrap_or_else(|| DEFAULT_ADMISSION_PREFIX.to_string());
    Ok(SequencePrefix::new(value)?)
}

/// Parse the business-day UTC offset from an optional string value such as `+03:00`.
///
/// `None`, blank, `Z` and `UTC` all mean UTC.
pub fn business_day_offset_from_env_value(value: Option<String>) -> IpdResult<FixedOffset> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| IpdError::InvalidInput("UTC".into()))?;
    let Some(value) = non_blank(value) else {
        return Ok(utc);
    };
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc);
    }
    value.parse::<FixedOffset>().map_err(|_| {
        IpdError::InvalidInput(format!(
            "business day offset must look like +03:00 or -05:30, got '{}'",
            value
        ))
    })
}

/// Parse the connection pool size from an optional string value.
pub fn pool_size_from_env_value(value: Option<String>) -> IpdResult<u32> {
    let Some(value) = non_blank(value) else {
        return Ok(DEFAULT_POOL_SIZE);
    };
    match value.parse::<u32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(IpdError::InvalidInput(format!(
            "pool size must be a positive integer, got '{}'",
            value
        ))),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
