//! Transactional storage for wards, beds, admissions and transfers.
//!
//! Every domain operation runs inside one [`StoreTx`]. Row locks are explicit: `lock_*` methods
//! block until the row is exclusively held by the calling transaction (or the configured lock wait
//! timeout expires, giving [`IpdError::Busy`](crate::IpdError::Busy)) and then return the row as
//! it is after the lock was granted. Plain reads are read-committed and never block.
//!
//! Locks are held until the transaction commits or is dropped. Dropping an uncommitted
//! transaction rolls back all of its writes.
//!
//! Callers must take locks in this order within one transaction:
//! sequence scope, admission, beds (ascending id), wards (ascending id).

mod memory;
mod postgres_store;

pub use memory::MemoryStore;
pub use postgres_store::PostgresStore;

use crate::model::{
    Admission, AdmissionFilter, AdmissionPage, Bed, BedCounts, BedTransfer, EncounterStatus, Ward,
    WardFilter,
};
use crate::IpdResult;
use chrono::{DateTime, Utc};
use ipd_uuid::{AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, WardId};

/// A store that can open transactions.
pub trait InpatientStore: Send + Sync {
    fn begin(&self) -> IpdResult<Box<dyn StoreTx + '_>>;
}

/// One open transaction.
pub trait StoreTx {
    /// Locks the sequence scope identified by `facility_id` and `stem` (prefix plus business day)
    /// and returns how many admission numbers in that facility already start with `stem`.
    fn lock_sequence_scope(&mut self, facility_id: Option<FacilityId>, stem: &str)
        -> IpdResult<u32>;
    fn lock_admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>>;
    fn lock_bed(&mut self, id: BedId) -> IpdResult<Option<Bed>>;
    fn lock_ward(&mut self, id: WardId) -> IpdResult<Option<Ward>>;

    fn ward(&mut self, id: WardId) -> IpdResult<Option<Ward>>;
    /// Wards matching `filter`, ordered by name.
    fn wards(&mut self, filter: &WardFilter) -> IpdResult<Vec<Ward>>;
    fn bed(&mut self, id: BedId) -> IpdResult<Option<Bed>>;
    /// All beds of a ward, retired ones included, ordered by bed number.
    fn beds_in_ward(&mut self, ward_id: WardId) -> IpdResult<Vec<Bed>>;
    /// Non-retired `Available` beds, optionally restricted to one ward, ordered by bed number.
    fn available_beds(&mut self, ward_id: Option<WardId>) -> IpdResult<Vec<Bed>>;
    fn count_beds(&mut self, ward_id: WardId) -> IpdResult<BedCounts>;
    fn admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>>;
    fn active_admission_for_patient(&mut self, patient_id: PatientId)
        -> IpdResult<Option<Admission>>;
    /// Admissions matching `filter`, newest first.
    fn admissions(&mut self, filter: &AdmissionFilter) -> IpdResult<AdmissionPage>;
    /// Transfers of one admission, oldest first.
    fn transfers_for_admission(&mut self, id: AdmissionId) -> IpdResult<Vec<BedTransfer>>;

    fn insert_ward(&mut self, ward: &Ward) -> IpdResult<()>;
    fn update_ward(&mut self, ward: &Ward) -> IpdResult<()>;
    fn insert_bed(&mut self, bed: &Bed) -> IpdResult<()>;
    fn update_bed(&mut self, bed: &Bed) -> IpdResult<()>;
    fn insert_admission(&mut self, admission: &Admission) -> IpdResult<()>;
    fn update_admission(&mut self, admission: &Admission) -> IpdResult<()>;
    fn insert_transfer(&mut self, transfer: &BedTransfer) -> IpdResult<()>;

    fn patient_exists(&mut self, id: PatientId) -> IpdResult<bool>;
    fn encounter_exists(&mut self, id: EncounterId) -> IpdResult<bool>;
    fn staff_exists(&mut self, id: StaffId) -> IpdResult<bool>;
    fn set_encounter_status(
        &mut self,
        id: EncounterId,
        status: EncounterStatus,
        at: DateTime<Utc>,
    ) -> IpdResult<()>;

    fn commit(self: Box<Self>) -> IpdResult<()>;
}

/// Runs `f` in a new transaction and commits if it succeeds.
///
/// On error the transaction is dropped, which rolls it back and releases its locks.
pub fn with_transaction<T>(
    store: &dyn InpatientStore,
    f: impl FnOnce(&mut dyn StoreTx) -> IpdResult<T>,
) -> IpdResult<T> {
    let mut tx = store.begin()?;
    let value = f(&mut *tx)?;
    tx.commit()?;
    Ok(value)
}
