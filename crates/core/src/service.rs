//! Entry point for every inpatient operation.
//!
//! [`InpatientService`] opens one store transaction per call and commits it only when every
//! step succeeded. It is cheap to clone and safe to share between threads.

use crate::admission;
use crate::bed_pool::{self, BedSpec};
use crate::config::CoreConfig;
use crate::model::{
    Admission, AdmissionFilter, AdmissionPage, AdmissionRequest, Bed, BedStatus, BedTransfer,
    BulkBeds, ClosureOutcome, DischargeRequest, NewBed, NewWard, TransferRequest, Ward,
    WardFilter, WardOccupancy, WardStatus, WardUpdate,
};
use crate::occupancy;
use crate::store::{with_transaction, InpatientStore};
use crate::transfer;
use crate::validation::{validate_bed_prefix, validate_bulk_count, validate_page};
use crate::{IpdError, IpdResult};
use chrono::Utc;
use ipd_types::NonEmptyText;
use ipd_uuid::{AdmissionId, BedId, FacilityId, PatientId, WardId};
use std::sync::Arc;

#[derive(Clone)]
pub struct InpatientService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn InpatientStore>,
}

impl InpatientService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn InpatientStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    // Wards

    pub fn create_ward(&self, new: NewWard) -> IpdResult<Ward> {
        let ward = Ward {
            id: WardId::new(),
            facility_id: new.facility_id,
            name: new.name,
            code: new.code,
            ward_type: new.ward_type,
            status: WardStatus::Active,
            floor: new.floor,
            description: new.description,
            total_beds: 0,
            occupied_beds: 0,
            created_at: Utc::now(),
        };
        with_transaction(self.store.as_ref(), |tx| tx.insert_ward(&ward))?;
        tracing::info!("created ward {} ({})", ward.code, ward.id);
        Ok(ward)
    }

    /// Updates ward metadata. Bed counters cannot be set this way.
    pub fn update_ward(&self, ward_id: WardId, update: WardUpdate) -> IpdResult<Ward> {
        with_transaction(self.store.as_ref(), |tx| {
            let mut ward = tx
                .lock_ward(ward_id)?
                .ok_or_else(|| IpdError::not_found("ward", ward_id))?;
            update.apply(&mut ward);
            tx.update_ward(&ward)?;
            Ok(ward)
        })
    }

    pub fn get_ward(&self, ward_id: WardId) -> IpdResult<Ward> {
        with_transaction(self.store.as_ref(), |tx| {
            tx.ward(ward_id)?
                .ok_or_else(|| IpdError::not_found("ward", ward_id))
        })
    }

    pub fn list_wards(&self, filter: &WardFilter) -> IpdResult<Vec<Ward>> {
        with_transaction(self.store.as_ref(), |tx| tx.wards(filter))
    }

    /// Occupancy of every ward, read from the ward counters.
    pub fn ward_occupancy(&self, facility_id: Option<FacilityId>) -> IpdResult<Vec<WardOccupancy>> {
        with_transaction(self.store.as_ref(), |tx| {
            occupancy::ward_occupancy(tx, facility_id)
        })
    }

    // Beds

    pub fn create_bed(&self, new: NewBed) -> IpdResult<Bed> {
        let spec = BedSpec {
            bed_number: new.bed_number,
            bed_type: new.bed_type,
            daily_rate_cents: new.daily_rate_cents,
        };
        let mut beds = self.add_beds(new.ward_id, vec![spec])?;
        beds.pop()
            .ok_or_else(|| IpdError::InvariantViolation("bed insert returned nothing".into()))
    }

    /// Creates `count` beds numbered `<prefix>01`, `<prefix>02`, ... in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the count or prefix is out of range, or if any generated
    /// number already exists in the ward. No beds are created in that case.
    pub fn bulk_create_beds(&self, bulk: BulkBeds) -> IpdResult<Vec<Bed>> {
        validate_bulk_count(bulk.count)?;
        validate_bed_prefix(&bulk.prefix)?;
        let specs = bulk
            .bed_numbers()
            .into_iter()
            .map(|number| -> IpdResult<BedSpec> {
                Ok(BedSpec {
                    bed_number: NonEmptyText::new(number)?,
                    bed_type: bulk.bed_type,
                    daily_rate_cents: bulk.daily_rate_cents,
                })
            })
            .collect::<IpdResult<Vec<_>>>()?;
        self.add_beds(bulk.ward_id, specs)
    }

    fn add_beds(&self, ward_id: WardId, specs: Vec<BedSpec>) -> IpdResult<Vec<Bed>> {
        let beds = with_transaction(self.store.as_ref(), |tx| {
            let beds = bed_pool::add_beds(tx, ward_id, specs, Utc::now())?;
            occupancy::recompute(tx, ward_id)?;
            Ok(beds)
        })?;
        tracing::info!("added {} bed(s) to ward {}", beds.len(), ward_id);
        Ok(beds)
    }

    pub fn get_bed(&self, bed_id: BedId) -> IpdResult<Bed> {
        with_transaction(self.store.as_ref(), |tx| {
            tx.bed(bed_id)?
                .ok_or_else(|| IpdError::not_found("bed", bed_id))
        })
    }

    /// All beds of a ward, retired ones included.
    pub fn list_beds(&self, ward_id: WardId) -> IpdResult<Vec<Bed>> {
        with_transaction(self.store.as_ref(), |tx| {
            tx.ward(ward_id)?
                .ok_or_else(|| IpdError::not_found("ward", ward_id))?;
            tx.beds_in_ward(ward_id)
        })
    }

    pub fn available_beds(&self, ward_id: Option<WardId>) -> IpdResult<Vec<Bed>> {
        with_transaction(self.store.as_ref(), |tx| tx.available_beds(ward_id))
    }

    /// Moves a bed between `Available`, `Reserved`, `Maintenance` and `Cleaning`.
    pub fn set_bed_status(&self, bed_id: BedId, status: BedStatus) -> IpdResult<Bed> {
        let bed = with_transaction(self.store.as_ref(), |tx| {
            bed_pool::set_operational_status(tx, bed_id, status)
        })?;
        tracing::info!("bed {} is now {}", bed_id, bed.status);
        Ok(bed)
    }

    /// Takes a bed out of service and drops it from its ward's total.
    pub fn retire_bed(&self, bed_id: BedId) -> IpdResult<Bed> {
        let bed = with_transaction(self.store.as_ref(), |tx| {
            let bed = bed_pool::retire(tx, bed_id, Utc::now())?;
            occupancy::recompute(tx, bed.ward_id)?;
            Ok(bed)
        })?;
        tracing::info!("retired bed {}", bed_id);
        Ok(bed)
    }

    // Admissions

    /// Admits a patient to a bed.
    ///
    /// Mints the admission number, claims the bed, records the admission, marks the encounter
    /// admitted and refreshes the ward counters, all in one transaction.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the patient, encounter, staff member, ward or bed does not exist.
    /// - `PatientAlreadyAdmitted` if the patient already has an active admission.
    /// - `BedUnavailable` if the bed is not available.
    /// - `Busy` if a lock could not be acquired within the configured wait. Safe to retry.
    /// - `SequenceExhausted` if the day's admission numbers are used up.
    pub fn create_admission(&self, request: AdmissionRequest) -> IpdResult<Admission> {
        let admission = with_transaction(self.store.as_ref(), |tx| {
            admission::create(tx, &self.cfg, request, Utc::now())
        })?;
        tracing::info!(
            "admitted {} as {} to bed {}",
            admission.patient_id,
            admission.admission_number,
            admission.placement().bed_id
        );
        Ok(admission)
    }

    pub fn discharge_admission(
        &self,
        admission_id: AdmissionId,
        request: DischargeRequest,
    ) -> IpdResult<Admission> {
        self.close_admission(admission_id, ClosureOutcome::Discharged, request)
    }

    pub fn record_abscondment(
        &self,
        admission_id: AdmissionId,
        request: DischargeRequest,
    ) -> IpdResult<Admission> {
        self.close_admission(admission_id, ClosureOutcome::Absconded, request)
    }

    pub fn record_death(
        &self,
        admission_id: AdmissionId,
        request: DischargeRequest,
    ) -> IpdResult<Admission> {
        self.close_admission(admission_id, ClosureOutcome::Deceased, request)
    }

    fn close_admission(
        &self,
        admission_id: AdmissionId,
        outcome: ClosureOutcome,
        request: DischargeRequest,
    ) -> IpdResult<Admission> {
        let admission = with_transaction(self.store.as_ref(), |tx| {
            admission::close(tx, admission_id, outcome, request, Utc::now())
        })?;
        tracing::info!("closed admission {} as {}", admission.admission_number, outcome);
        Ok(admission)
    }

    /// Moves an admitted patient to another bed, possibly in another ward.
    ///
    /// # Errors
    ///
    /// - `NotAdmitted` if the admission is closed.
    /// - `BedUnavailable` or `NotFound` for the destination bed. The patient stays where they
    ///   were.
    /// - `InvalidInput` if the destination is the current bed or is not in `to_ward_id`.
    pub fn transfer_admission(
        &self,
        admission_id: AdmissionId,
        request: TransferRequest,
    ) -> IpdResult<Admission> {
        let (admission, record) = with_transaction(self.store.as_ref(), |tx| {
            transfer::transfer(tx, admission_id, request, Utc::now())
        })?;
        tracing::info!(
            "transferred admission {} ({}) to bed {}",
            admission.admission_number,
            record.reason,
            record.to.bed_id
        );
        Ok(admission)
    }

    pub fn get_admission(&self, admission_id: AdmissionId) -> IpdResult<Admission> {
        with_transaction(self.store.as_ref(), |tx| admission::get(tx, admission_id))
    }

    /// The patient's active admission, if they are currently admitted.
    pub fn current_admission(&self, patient_id: PatientId) -> IpdResult<Option<Admission>> {
        with_transaction(self.store.as_ref(), |tx| {
            tx.active_admission_for_patient(patient_id)
        })
    }

    pub fn list_admissions(&self, filter: &AdmissionFilter) -> IpdResult<AdmissionPage> {
        validate_page(filter.page, filter.limit)?;
        with_transaction(self.store.as_ref(), |tx| tx.admissions(filter))
    }

    pub fn transfer_history(&self, admission_id: AdmissionId) -> IpdResult<Vec<BedTransfer>> {
        with_transaction(self.store.as_ref(), |tx| {
            admission::get(tx, admission_id)?;
            tx.transfers_for_admission(admission_id)
        })
    }
}
