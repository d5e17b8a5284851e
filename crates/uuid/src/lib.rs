//! Record identifiers for the inpatient core.
//!
//! Every persisted record (ward, bed, admission, transfer) and every collaborator reference
//! (patient, encounter, staff, facility) is keyed by a UUID. Identifiers use a *canonical*
//! textual representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`RecordId`], a wrapper that guarantees the canonical format once constructed.
//! - Typed newtypes ([`WardId`], [`BedId`], ...) so a bed id can never be passed where a ward id
//!   is expected.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Canonical form is *required* for externally supplied identifiers (CLI arguments, path
//! parameters). Hyphenated or uppercase input is rejected rather than normalised.
//!
//! ## Ordering
//! All identifiers are totally ordered. The core relies on this to acquire several row locks of
//! the same kind in a stable order.

mod record;
mod typed;

pub use record::{RecordId, Uuid};
pub use typed::{
    AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, TransferId, WardId,
};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
