//! In-process store with the same locking semantics as the Postgres backend.
//!
//! Committed rows live behind one mutex. Row locks are entries in a lock table keyed by row and
//! owned by a transaction id; waiters park on a condition variable until the holder commits or
//! rolls back, or until the lock wait timeout passes. Each transaction buffers its writes in an
//! overlay that is applied to the committed rows on commit, so other transactions never observe
//! uncommitted data.

use super::{InpatientStore, StoreTx};
use crate::config::CoreConfig;
use crate::model::{
    Admission, AdmissionFilter, AdmissionPage, Bed, BedCounts, BedStatus, BedTransfer,
    EncounterStatus, Ward, WardFilter,
};
use crate::{IpdError, IpdResult};
use chrono::{DateTime, Utc};
use ipd_uuid::{AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, WardId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type TxId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum LockKey {
    Sequence(Option<FacilityId>, String),
    Admission(AdmissionId),
    Bed(BedId),
    Ward(WardId),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Sequence(Some(facility), stem) => write!(f, "sequence {stem} ({facility})"),
            LockKey::Sequence(None, stem) => write!(f, "sequence {stem}"),
            LockKey::Admission(id) => write!(f, "admission {id}"),
            LockKey::Bed(id) => write!(f, "bed {id}"),
            LockKey::Ward(id) => write!(f, "ward {id}"),
        }
    }
}

#[derive(Default)]
struct Tables {
    wards: HashMap<WardId, Ward>,
    beds: HashMap<BedId, Bed>,
    admissions: HashMap<AdmissionId, Admission>,
    transfers: Vec<BedTransfer>,
    patients: HashSet<PatientId>,
    staff: HashSet<StaffId>,
    encounters: HashMap<EncounterId, Option<EncounterStatus>>,
}

/// In-memory [`InpatientStore`], used by tests and for local development.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    locks: Mutex<HashMap<LockKey, TxId>>,
    released: Condvar,
    next_tx: AtomicU64,
    lock_wait_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_wait_timeout: Duration) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            next_tx: AtomicU64::new(1),
            lock_wait_timeout,
        }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(cfg.lock_wait_timeout())
    }

    /// Makes a patient known to the registration collaborator.
    pub fn register_patient(&self, id: PatientId) -> IpdResult<()> {
        self.tables()?.patients.insert(id);
        Ok(())
    }

    pub fn register_staff(&self, id: StaffId) -> IpdResult<()> {
        self.tables()?.staff.insert(id);
        Ok(())
    }

    pub fn register_encounter(&self, id: EncounterId) -> IpdResult<()> {
        self.tables()?.encounters.entry(id).or_insert(None);
        Ok(())
    }

    /// Last status this crate wrote to an encounter, if any.
    pub fn encounter_status(&self, id: EncounterId) -> IpdResult<Option<EncounterStatus>> {
        Ok(self.tables()?.encounters.get(&id).copied().flatten())
    }

    fn tables(&self) -> IpdResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| poisoned())
    }

    fn acquire(&self, tx: TxId, key: LockKey) -> IpdResult<()> {
        let deadline = Instant::now() + self.lock_wait_timeout;
        let mut locks = self.locks.lock().map_err(|_| poisoned())?;
        loop {
            match locks.get(&key) {
                None => {
                    locks.insert(key, tx);
                    return Ok(());
                }
                Some(holder) if *holder == tx => return Ok(()),
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(IpdError::Busy(key.to_string()));
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(locks, deadline - now)
                        .map_err(|_| poisoned())?;
                    locks = guard;
                }
            }
        }
    }

    fn release_all(&self, tx: TxId) {
        // Runs from Drop, so a poisoned table is recovered rather than reported.
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|_, holder| *holder != tx);
        drop(locks);
        self.released.notify_all();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::constants::DEFAULT_LOCK_WAIT_TIMEOUT_MS))
    }
}

impl InpatientStore for MemoryStore {
    fn begin(&self) -> IpdResult<Box<dyn StoreTx + '_>> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryTx {
            store: self,
            id,
            overlay: Overlay::default(),
        }))
    }
}

#[derive(Default)]
struct Overlay {
    wards: HashMap<WardId, Ward>,
    beds: HashMap<BedId, Bed>,
    admissions: HashMap<AdmissionId, Admission>,
    transfers: Vec<BedTransfer>,
    encounters: HashMap<EncounterId, EncounterStatus>,
}

struct MemoryTx<'a> {
    store: &'a MemoryStore,
    id: TxId,
    overlay: Overlay,
}

/// Committed rows with this transaction's own writes laid over them.
fn merged<K, V>(committed: &HashMap<K, V>, overlay: &HashMap<K, V>) -> Vec<V>
where
    K: Eq + Hash,
    V: Clone,
{
    let mut rows: Vec<V> = committed
        .iter()
        .filter(|(key, _)| !overlay.contains_key(key))
        .map(|(_, row)| row.clone())
        .collect();
    rows.extend(overlay.values().cloned());
    rows
}

impl MemoryTx<'_> {
    fn get_ward(&self, id: WardId) -> IpdResult<Option<Ward>> {
        if let Some(ward) = self.overlay.wards.get(&id) {
            return Ok(Some(ward.clone()));
        }
        Ok(self.store.tables()?.wards.get(&id).cloned())
    }

    fn get_bed(&self, id: BedId) -> IpdResult<Option<Bed>> {
        if let Some(bed) = self.overlay.beds.get(&id) {
            return Ok(Some(bed.clone()));
        }
        Ok(self.store.tables()?.beds.get(&id).cloned())
    }

    fn get_admission(&self, id: AdmissionId) -> IpdResult<Option<Admission>> {
        if let Some(admission) = self.overlay.admissions.get(&id) {
            return Ok(Some(admission.clone()));
        }
        Ok(self.store.tables()?.admissions.get(&id).cloned())
    }

    fn all_beds(&self) -> IpdResult<Vec<Bed>> {
        Ok(merged(&self.store.tables()?.beds, &self.overlay.beds))
    }

    fn all_admissions(&self) -> IpdResult<Vec<Admission>> {
        Ok(merged(
            &self.store.tables()?.admissions,
            &self.overlay.admissions,
        ))
    }

    fn exists_for_update<T>(&self, found: bool, entity: &'static str, id: T) -> IpdResult<()>
    where
        T: fmt::Display,
    {
        if found {
            Ok(())
        } else {
            Err(IpdError::not_found(entity, id))
        }
    }
}

impl StoreTx for MemoryTx<'_> {
    fn lock_sequence_scope(
        &mut self,
        facility_id: Option<FacilityId>,
        stem: &str,
    ) -> IpdResult<u32> {
        self.store
            .acquire(self.id, LockKey::Sequence(facility_id, stem.to_string()))?;
        let count = self
            .all_admissions()?
            .iter()
            .filter(|a| a.facility_id == facility_id && a.admission_number.starts_with(stem))
            .count();
        u32::try_from(count).map_err(|_| IpdError::Storage("sequence count overflow".into()))
    }

    fn lock_admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>> {
        self.store.acquire(self.id, LockKey::Admission(id))?;
        self.get_admission(id)
    }

    fn lock_bed(&mut self, id: BedId) -> IpdResult<Option<Bed>> {
        self.store.acquire(self.id, LockKey::Bed(id))?;
        self.get_bed(id)
    }

    fn lock_ward(&mut self, id: WardId) -> IpdResult<Option<Ward>> {
        self.store.acquire(self.id, LockKey::Ward(id))?;
        self.get_ward(id)
    }

    fn ward(&mut self, id: WardId) -> IpdResult<Option<Ward>> {
        self.get_ward(id)
    }

    fn wards(&mut self, filter: &WardFilter) -> IpdResult<Vec<Ward>> {
        let mut wards: Vec<Ward> = merged(&self.store.tables()?.wards, &self.overlay.wards)
            .into_iter()
            .filter(|w| filter.matches(w))
            .collect();
        wards.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wards)
    }

    fn bed(&mut self, id: BedId) -> IpdResult<Option<Bed>> {
        self.get_bed(id)
    }

    fn beds_in_ward(&mut self, ward_id: WardId) -> IpdResult<Vec<Bed>> {
        let mut beds: Vec<Bed> = self
            .all_beds()?
            .into_iter()
            .filter(|b| b.ward_id == ward_id)
            .collect();
        beds.sort_by(|a, b| a.bed_number.cmp(&b.bed_number));
        Ok(beds)
    }

    fn available_beds(&mut self, ward_id: Option<WardId>) -> IpdResult<Vec<Bed>> {
        let mut beds: Vec<Bed> = self
            .all_beds()?
            .into_iter()
            .filter(|b| b.is_claimable() && ward_id.map_or(true, |w| b.ward_id == w))
            .collect();
        beds.sort_by(|a, b| a.bed_number.cmp(&b.bed_number));
        Ok(beds)
    }

    fn count_beds(&mut self, ward_id: WardId) -> IpdResult<BedCounts> {
        let mut counts = BedCounts::default();
        for bed in self.all_beds()? {
            if bed.ward_id != ward_id || bed.is_retired() {
                continue;
            }
            counts.total += 1;
            if bed.status == BedStatus::Occupied {
                counts.occupied += 1;
            }
        }
        Ok(counts)
    }

    fn admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>> {
        self.get_admission(id)
    }

    fn active_admission_for_patient(
        &mut self,
        patient_id: PatientId,
    ) -> IpdResult<Option<Admission>> {
        Ok(self
            .all_admissions()?
            .into_iter()
            .find(|a| a.patient_id == patient_id && a.is_active()))
    }

    fn admissions(&mut self, filter: &AdmissionFilter) -> IpdResult<AdmissionPage> {
        let mut matching: Vec<Admission> = self
            .all_admissions()?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        matching.sort_by(|a, b| {
            b.admitted_at
                .cmp(&a.admitted_at)
                .then_with(|| b.admission_number.cmp(&a.admission_number))
        });
        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .collect();
        Ok(AdmissionPage { data, total })
    }

    fn transfers_for_admission(&mut self, id: AdmissionId) -> IpdResult<Vec<BedTransfer>> {
        let tables = self.store.tables()?;
        Ok(tables
            .transfers
            .iter()
            .chain(self.overlay.transfers.iter())
            .filter(|t| t.admission_id == id)
            .cloned()
            .collect())
    }

    fn insert_ward(&mut self, ward: &Ward) -> IpdResult<()> {
        self.overlay.wards.insert(ward.id, ward.clone());
        Ok(())
    }

    fn update_ward(&mut self, ward: &Ward) -> IpdResult<()> {
        let found = self.get_ward(ward.id)?.is_some();
        self.exists_for_update(found, "ward", ward.id)?;
        self.overlay.wards.insert(ward.id, ward.clone());
        Ok(())
    }

    fn insert_bed(&mut self, bed: &Bed) -> IpdResult<()> {
        self.overlay.beds.insert(bed.id, bed.clone());
        Ok(())
    }

    fn update_bed(&mut self, bed: &Bed) -> IpdResult<()> {
        let found = self.get_bed(bed.id)?.is_some();
        self.exists_for_update(found, "bed", bed.id)?;
        self.overlay.beds.insert(bed.id, bed.clone());
        Ok(())
    }

    fn insert_admission(&mut self, admission: &Admission) -> IpdResult<()> {
        self.overlay
            .admissions
            .insert(admission.id, admission.clone());
        Ok(())
    }

    fn update_admission(&mut self, admission: &Admission) -> IpdResult<()> {
        let found = self.get_admission(admission.id)?.is_some();
        self.exists_for_update(found, "admission", admission.id)?;
        self.overlay
            .admissions
            .insert(admission.id, admission.clone());
        Ok(())
    }

    fn insert_transfer(&mut self, transfer: &BedTransfer) -> IpdResult<()> {
        self.overlay.transfers.push(transfer.clone());
        Ok(())
    }

    fn patient_exists(&mut self, id: PatientId) -> IpdResult<bool> {
        Ok(self.store.tables()?.patients.contains(&id))
    }

    fn encounter_exists(&mut self, id: EncounterId) -> IpdResult<bool> {
        Ok(self.store.tables()?.encounters.contains_key(&id))
    }

    fn staff_exists(&mut self, id: StaffId) -> IpdResult<bool> {
        Ok(self.store.tables()?.staff.contains(&id))
    }

    fn set_encounter_status(
        &mut self,
        id: EncounterId,
        status: EncounterStatus,
        _at: DateTime<Utc>,
    ) -> IpdResult<()> {
        if !self.encounter_exists(id)? {
            return Err(IpdError::not_found("encounter", id));
        }
        self.overlay.encounters.insert(id, status);
        Ok(())
    }

    fn commit(self: Box<Self>) -> IpdResult<()> {
        let mut tx = self;
        let overlay = std::mem::take(&mut tx.overlay);
        {
            let mut tables = tx.store.tables()?;
            check_unique_constraints(&tables, &overlay)?;
            tables.wards.extend(overlay.wards);
            tables.beds.extend(overlay.beds);
            tables.admissions.extend(overlay.admissions);
            tables.transfers.extend(overlay.transfers);
            for (id, status) in overlay.encounters {
                tables.encounters.insert(id, Some(status));
            }
        }
        // Drop releases the locks after the writes are visible.
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        self.store.release_all(self.id);
    }
}

/// The constraints the Postgres schema enforces with unique indexes.
fn check_unique_constraints(tables: &Tables, overlay: &Overlay) -> IpdResult<()> {
    for admission in overlay.admissions.values() {
        let others = tables
            .admissions
            .values()
            .filter(|a| a.id != admission.id && !overlay.admissions.contains_key(&a.id))
            .chain(overlay.admissions.values().filter(|a| a.id != admission.id));
        for other in others {
            if other.facility_id == admission.facility_id
                && other.admission_number == admission.admission_number
            {
                return Err(IpdError::InvariantViolation(format!(
                    "duplicate admission number {}",
                    admission.admission_number
                )));
            }
            if let (Some(mine), Some(theirs)) =
                (admission.active_placement(), other.active_placement())
            {
                if mine.bed_id == theirs.bed_id {
                    return Err(IpdError::InvariantViolation(format!(
                        "bed {} held by two active admissions",
                        mine.bed_id
                    )));
                }
            }
        }
    }
    Ok(())
}

fn poisoned() -> IpdError {
    IpdError::Storage("memory store mutex poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BedType, WardStatus, WardType};
    use ipd_types::NonEmptyText;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn ward() -> Ward {
        Ward {
            id: WardId::new(),
            facility_id: None,
            name: NonEmptyText::new("General A").unwrap(),
            code: NonEmptyText::new("GEN-A").unwrap(),
            ward_type: WardType::General,
            status: WardStatus::Active,
            floor: Some(1),
            description: None,
            total_beds: 0,
            occupied_beds: 0,
            created_at: Utc::now(),
        }
    }

    fn bed(ward_id: WardId) -> Bed {
        Bed {
            id: BedId::new(),
            ward_id,
            bed_number: NonEmptyText::new("A01").unwrap(),
            bed_type: BedType::Standard,
            status: BedStatus::Available,
            daily_rate_cents: 0,
            retired_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_uncommitted_writes_are_invisible_and_rolled_back_on_drop() {
        let store = MemoryStore::default();
        let ward = ward();

        {
            let mut tx = store.begin().expect("begin should succeed");
            tx.insert_ward(&ward).expect("insert should succeed");
            assert!(tx.ward(ward.id).unwrap().is_some());

            let mut other = store.begin().expect("begin should succeed");
            assert!(other.ward(ward.id).unwrap().is_none());
        }

        let mut tx = store.begin().expect("begin should succeed");
        assert!(tx.ward(ward.id).unwrap().is_none());
    }

    #[test]
    fn test_committed_writes_are_visible() {
        let store = MemoryStore::default();
        let ward = ward();

        let mut tx = store.begin().expect("begin should succeed");
        tx.insert_ward(&ward).expect("insert should succeed");
        tx.commit().expect("commit should succeed");

        let mut tx = store.begin().expect("begin should succeed");
        assert_eq!(tx.ward(ward.id).unwrap(), Some(ward));
    }

    #[test]
    fn test_lock_times_out_with_busy() {
        let store = MemoryStore::new(Duration::from_millis(50));
        let ward = ward();
        let bed = bed(ward.id);
        let mut setup = store.begin().unwrap();
        setup.insert_bed(&bed).unwrap();
        setup.commit().unwrap();

        let mut holder = store.begin().unwrap();
        holder.lock_bed(bed.id).expect("first lock should succeed");

        let mut waiter = store.begin().unwrap();
        let err = waiter.lock_bed(bed.id).expect_err("second lock should time out");
        assert!(matches!(err, IpdError::Busy(_)));

        // Re-entrant for the holder.
        assert!(holder.lock_bed(bed.id).unwrap().is_some());
    }

    #[test]
    fn test_waiter_sees_holders_committed_write() {
        let store = Arc::new(MemoryStore::default());
        let ward = ward();
        let bed = bed(ward.id);
        let mut setup = store.begin().unwrap();
        setup.insert_bed(&bed).unwrap();
        setup.commit().unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let mut holder = store.begin().unwrap();
        let mut locked = holder.lock_bed(bed.id).unwrap().unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut tx = store.begin().unwrap();
                barrier.wait();
                tx.lock_bed(bed.id).unwrap().unwrap().status
            })
        };

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        locked.status = BedStatus::Occupied;
        holder.update_bed(&locked).unwrap();
        holder.commit().unwrap();

        assert_eq!(waiter.join().unwrap(), BedStatus::Occupied);
    }

    #[test]
    fn test_update_of_missing_row_is_not_found() {
        let store = MemoryStore::default();
        let mut tx = store.begin().unwrap();
        let err = tx.update_ward(&ward()).expect_err("update should fail");
        assert!(matches!(err, IpdError::NotFound { entity: "ward", .. }));
    }
}
