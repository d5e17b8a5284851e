//! Admission lifecycle: admit to a bed, then close by discharge, abscondment or death.
//!
//! Each function runs entirely inside the caller's transaction. Any error leaves the
//! transaction to be dropped, which undoes every write made so far, including the bed claim
//! and the minted admission number.

use crate::bed_pool;
use crate::config::CoreConfig;
use crate::model::{
    Admission, AdmissionRequest, AdmissionState, BedStatus, ClosureOutcome, DischargeRequest,
    EncounterStatus, Placement,
};
use crate::occupancy;
use crate::sequence::{business_day, next_sequence_number, SequenceScope};
use crate::store::StoreTx;
use crate::{IpdError, IpdResult};
use chrono::{DateTime, Utc};
use ipd_uuid::{AdmissionId, StaffId};

pub(crate) fn require_staff(tx: &mut dyn StoreTx, id: StaffId) -> IpdResult<()> {
    if !tx.staff_exists(id)? {
        return Err(IpdError::not_found("staff", id));
    }
    Ok(())
}

/// Admits a patient to the requested bed.
///
/// The patient check is a plain read and does not lock anything, so two concurrent admissions
/// of the same patient to different beds can both succeed.
pub fn create(
    tx: &mut dyn StoreTx,
    cfg: &CoreConfig,
    request: AdmissionRequest,
    now: DateTime<Utc>,
) -> IpdResult<Admission> {
    if !tx.patient_exists(request.patient_id)? {
        return Err(IpdError::not_found("patient", request.patient_id));
    }
    if !tx.encounter_exists(request.encounter_id)? {
        return Err(IpdError::not_found("encounter", request.encounter_id));
    }
    require_staff(tx, request.admitted_by)?;
    if let Some(doctor) = request.attending_doctor_id {
        require_staff(tx, doctor)?;
    }
    tx.ward(request.ward_id)?
        .ok_or_else(|| IpdError::not_found("ward", request.ward_id))?;

    if let Some(existing) = tx.active_admission_for_patient(request.patient_id)? {
        return Err(IpdError::PatientAlreadyAdmitted {
            patient_id: request.patient_id,
            admission_id: existing.id,
        });
    }

    let scope = SequenceScope::new(request.facility_id, cfg.admission_prefix().clone());
    let day = business_day(now, cfg.business_day_offset());
    let number = next_sequence_number(tx, &scope, day)?;

    let bed = bed_pool::try_claim_in_ward(tx, request.ward_id, request.bed_id)?;

    let admission = Admission {
        id: AdmissionId::new(),
        admission_number: number.value,
        facility_id: request.facility_id,
        patient_id: request.patient_id,
        encounter_id: request.encounter_id,
        admission_type: request.admission_type,
        admitted_at: now,
        admitted_by: request.admitted_by,
        attending_doctor_id: request.attending_doctor_id,
        admission_reason: request.admission_reason,
        admission_diagnosis: request.admission_diagnosis,
        transfer_count: 0,
        state: AdmissionState::Active {
            placement: Placement {
                ward_id: bed.ward_id,
                bed_id: bed.id,
            },
        },
    };
    tx.insert_admission(&admission)?;
    tx.set_encounter_status(admission.encounter_id, EncounterStatus::Admitted, now)?;
    occupancy::recompute(tx, bed.ward_id)?;

    Ok(admission)
}

/// Ends an active admission with `outcome`, sending its bed to cleaning.
///
/// # Errors
///
/// [`IpdError::NotAdmitted`] if the admission is already closed. The bed is not touched in
/// that case, so repeating a discharge can never release a bed twice.
pub fn close(
    tx: &mut dyn StoreTx,
    admission_id: AdmissionId,
    outcome: ClosureOutcome,
    request: DischargeRequest,
    now: DateTime<Utc>,
) -> IpdResult<Admission> {
    require_staff(tx, request.closed_by)?;

    let mut admission = tx
        .lock_admission(admission_id)?
        .ok_or_else(|| IpdError::not_found("admission", admission_id))?;
    let Some(placement) = admission.active_placement() else {
        return Err(IpdError::NotAdmitted {
            admission_id,
            status: admission.status(),
        });
    };

    bed_pool::release(tx, placement.bed_id, BedStatus::Cleaning)?;

    admission.state = AdmissionState::Closed {
        outcome,
        last_placement: placement,
        closed_at: now,
        closed_by: request.closed_by,
        details: request.details,
    };
    tx.update_admission(&admission)?;
    occupancy::recompute(tx, placement.ward_id)?;
    tx.set_encounter_status(admission.encounter_id, EncounterStatus::Completed, now)?;

    Ok(admission)
}

/// Reads one admission.
pub fn get(tx: &mut dyn StoreTx, admission_id: AdmissionId) -> IpdResult<Admission> {
    tx.admission(admission_id)?
        .ok_or_else(|| IpdError::not_found("admission", admission_id))
}
