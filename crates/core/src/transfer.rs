//! Moving an admitted patient to another bed.

use crate::admission::require_staff;
use crate::bed_pool;
use crate::model::{Admission, AdmissionState, BedStatus, BedTransfer, Placement, TransferRequest};
use crate::occupancy;
use crate::store::StoreTx;
use crate::{IpdError, IpdResult};
use chrono::{DateTime, Utc};
use ipd_uuid::{AdmissionId, TransferId};

/// Transfers an active admission to `request.to_bed_id`.
///
/// The destination is claimed before the source is released. If the claim fails the error is
/// returned with nothing written, and the patient keeps the source bed. Both beds are locked in
/// id order before either is inspected, so two transfers swapping beds cannot deadlock.
pub fn transfer(
    tx: &mut dyn StoreTx,
    admission_id: AdmissionId,
    request: TransferRequest,
    now: DateTime<Utc>,
) -> IpdResult<(Admission, BedTransfer)> {
    require_staff(tx, request.transferred_by)?;

    let mut admission = tx
        .lock_admission(admission_id)?
        .ok_or_else(|| IpdError::not_found("admission", admission_id))?;
    let Some(from) = admission.active_placement() else {
        return Err(IpdError::NotAdmitted {
            admission_id,
            status: admission.status(),
        });
    };
    if from.bed_id == request.to_bed_id {
        return Err(IpdError::InvalidInput(
            "destination bed is the current bed".into(),
        ));
    }

    bed_pool::lock_in_order(tx, &[from.bed_id, request.to_bed_id])?;
    let destination = bed_pool::try_claim_in_ward(tx, request.to_ward_id, request.to_bed_id)?;
    bed_pool::release(tx, from.bed_id, BedStatus::Cleaning)?;

    let to = Placement {
        ward_id: destination.ward_id,
        bed_id: destination.id,
    };
    let record = BedTransfer {
        id: TransferId::new(),
        admission_id,
        from,
        to,
        reason: request.reason,
        notes: request.notes,
        transferred_at: now,
        transferred_by: request.transferred_by,
    };
    tx.insert_transfer(&record)?;

    admission.state = AdmissionState::Active { placement: to };
    admission.transfer_count += 1;
    tx.update_admission(&admission)?;

    occupancy::recompute_all(tx, &[from.ward_id, to.ward_id])?;

    tracing::debug!(
        "admission {} moved from bed {} to bed {}",
        admission_id,
        from.bed_id,
        to.bed_id
    );
    Ok((admission, record))
}
