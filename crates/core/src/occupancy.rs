//! Ward occupancy counters.
//!
//! A ward's `total_beds` and `occupied_beds` are recomputed from its bed rows, never adjusted
//! by increments. The recompute locks the ward row before counting, so the count includes every
//! bed change committed before the lock was granted and two recomputes cannot interleave.

use crate::model::{Ward, WardFilter, WardOccupancy};
use crate::store::StoreTx;
use crate::{IpdError, IpdResult};
use ipd_uuid::{FacilityId, WardId};

/// Recounts the ward's beds and stores the result on the ward.
pub fn recompute(tx: &mut dyn StoreTx, ward_id: WardId) -> IpdResult<Ward> {
    let mut ward = tx
        .lock_ward(ward_id)?
        .ok_or_else(|| IpdError::not_found("ward", ward_id))?;
    let counts = tx.count_beds(ward_id)?;
    if counts.occupied > counts.total {
        return Err(IpdError::InvariantViolation(format!(
            "ward {} has {} occupied of {} beds",
            ward_id, counts.occupied, counts.total
        )));
    }
    if ward.total_beds != counts.total || ward.occupied_beds != counts.occupied {
        tracing::debug!(
            "ward {} counters {}/{} -> {}/{}",
            ward_id,
            ward.occupied_beds,
            ward.total_beds,
            counts.occupied,
            counts.total
        );
        ward.total_beds = counts.total;
        ward.occupied_beds = counts.occupied;
        tx.update_ward(&ward)?;
    }
    Ok(ward)
}

/// Recomputes several wards, locking them in ascending id order. Duplicates are ignored.
pub fn recompute_all(tx: &mut dyn StoreTx, ward_ids: &[WardId]) -> IpdResult<Vec<Ward>> {
    let mut ids = ward_ids.to_vec();
    ids.sort();
    ids.dedup();
    let mut wards = Vec::with_capacity(ids.len());
    for id in ids {
        wards.push(recompute(tx, id)?);
    }
    Ok(wards)
}

/// Occupied share as a whole percentage, rounded half up. Zero for a ward with no beds.
pub fn occupancy_rate(total: u32, occupied: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = u64::from(occupied) * 100;
    let total = u64::from(total);
    ((scaled * 2 + total) / (total * 2)) as u32
}

impl WardOccupancy {
    pub fn from_ward(ward: &Ward) -> Self {
        Self {
            ward_id: ward.id,
            name: ward.name.to_string(),
            code: ward.code.to_string(),
            ward_type: ward.ward_type,
            total_beds: ward.total_beds,
            occupied_beds: ward.occupied_beds,
            unoccupied_beds: ward.total_beds.saturating_sub(ward.occupied_beds),
            occupancy_rate: occupancy_rate(ward.total_beds, ward.occupied_beds),
        }
    }
}

/// Occupancy of every ward, optionally restricted to one facility, ordered by ward name.
pub fn ward_occupancy(
    tx: &mut dyn StoreTx,
    facility_id: Option<FacilityId>,
) -> IpdResult<Vec<WardOccupancy>> {
    let filter = WardFilter {
        facility_id,
        ..WardFilter::default()
    };
    Ok(tx
        .wards(&filter)?
        .iter()
        .map(WardOccupancy::from_ward)
        .collect())
}
