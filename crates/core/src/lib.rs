//! # IPD Core
//!
//! Core business logic for inpatient bed and ward management.
//!
//! This crate owns the transactional core of an inpatient department:
//! - Date-scoped admission numbers minted without duplicates under concurrency
//! - Exclusive bed allocation with row-level locks
//! - Ward occupancy counters recomputed from bed rows inside the same transaction
//! - The admission lifecycle (admit, discharge, abscond, death) and bed transfers
//!
//! **No API concerns**: HTTP servers and CLIs belong in `api-rest` and `ipd-cli`.

pub mod admission;
pub mod bed_pool;
pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod occupancy;
pub mod sequence;
pub mod service;
pub mod store;
pub mod transfer;
pub mod validation;

pub use config::CoreConfig;
pub use error::{IpdError, IpdResult};
pub use service::InpatientService;
pub use store::{InpatientStore, MemoryStore, PostgresStore};

pub use ipd_types::{NonEmptyText, SequencePrefix, TextError};
pub use ipd_uuid::{
    AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, TransferId, WardId,
};
