//! Constants used throughout the IPD core crate.

/// Default prefix for admission numbers (`ADM202601150001`).
pub const DEFAULT_ADMISSION_PREFIX: &str = "ADM";

/// Number of digits in the per-day counter of a reference number.
pub const SEQUENCE_DIGITS: usize = 4;

/// Largest counter value that fits in [`SEQUENCE_DIGITS`] digits.
pub const MAX_SEQUENCE_VALUE: u32 = 9_999;

/// Default bound on how long an operation waits for a row lock before failing with `Busy`.
pub const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Upper bound accepted for the lock wait timeout.
pub const MAX_LOCK_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Default size of the Postgres connection pool.
pub const DEFAULT_POOL_SIZE: u32 = 16;

/// Largest number of beds accepted by a single bulk bed creation.
pub const MAX_BULK_BEDS: u32 = 200;

/// Default page size for admission listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size accepted for admission listings.
pub const MAX_PAGE_LIMIT: u32 = 200;
