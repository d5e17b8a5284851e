//! Exclusive allocation of physical beds.
//!
//! Every status change takes the bed's row lock first and re-reads the bed under it, so two
//! transactions can never both see the same bed as available. None of these functions touch
//! ward counters; callers recompute the owning ward in the same transaction.

use crate::model::{Bed, BedStatus, BedType};
use crate::store::StoreTx;
use crate::validation::validate_daily_rate;
use crate::{IpdError, IpdResult};
use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::{BedId, WardId};
use std::collections::HashSet;

/// Locks `bed_id` and marks it occupied.
///
/// # Errors
///
/// - [`IpdError::NotFound`] if the bed does not exist.
/// - [`IpdError::BedUnavailable`] if it is retired or not `Available`. Nothing is written.
pub fn try_claim(tx: &mut dyn StoreTx, bed_id: BedId) -> IpdResult<Bed> {
    let mut bed = tx
        .lock_bed(bed_id)?
        .ok_or_else(|| IpdError::not_found("bed", bed_id))?;
    if !bed.is_claimable() {
        return Err(IpdError::BedUnavailable {
            bed_id,
            status: bed.status,
        });
    }
    bed.status = BedStatus::Occupied;
    tx.update_bed(&bed)?;
    Ok(bed)
}

/// Like [`try_claim`], but also requires the bed to belong to `ward_id`.
pub fn try_claim_in_ward(tx: &mut dyn StoreTx, ward_id: WardId, bed_id: BedId) -> IpdResult<Bed> {
    let bed = try_claim(tx, bed_id)?;
    if bed.ward_id != ward_id {
        return Err(IpdError::InvalidInput(format!(
            "bed {} does not belong to ward {}",
            bed_id, ward_id
        )));
    }
    Ok(bed)
}

/// Frees an occupied bed, leaving it in `next_status` (normally `Cleaning`).
///
/// Releasing a bed that is not occupied means an admission and its bed disagree, which is
/// reported as [`IpdError::InvariantViolation`] so the whole transaction rolls back.
pub fn release(tx: &mut dyn StoreTx, bed_id: BedId, next_status: BedStatus) -> IpdResult<Bed> {
    if next_status == BedStatus::Occupied {
        return Err(IpdError::InvalidInput(
            "a released bed cannot stay occupied".into(),
        ));
    }
    let mut bed = tx
        .lock_bed(bed_id)?
        .ok_or_else(|| IpdError::not_found("bed", bed_id))?;
    if bed.status != BedStatus::Occupied {
        return Err(IpdError::InvariantViolation(format!(
            "released bed {} was {}, not occupied",
            bed_id, bed.status
        )));
    }
    bed.status = next_status;
    tx.update_bed(&bed)?;
    Ok(bed)
}

/// Locks a set of beds in ascending id order.
pub fn lock_in_order(tx: &mut dyn StoreTx, bed_ids: &[BedId]) -> IpdResult<()> {
    let mut ids = bed_ids.to_vec();
    ids.sort();
    ids.dedup();
    for id in ids {
        tx.lock_bed(id)?;
    }
    Ok(())
}

/// Moves a bed between the non-occupied operational statuses, for example from `Cleaning`
/// back to `Available` or into `Maintenance`.
pub fn set_operational_status(
    tx: &mut dyn StoreTx,
    bed_id: BedId,
    status: BedStatus,
) -> IpdResult<Bed> {
    if status == BedStatus::Occupied {
        return Err(IpdError::InvalidInput(
            "beds become occupied only through an admission or transfer".into(),
        ));
    }
    let mut bed = tx
        .lock_bed(bed_id)?
        .ok_or_else(|| IpdError::not_found("bed", bed_id))?;
    if bed.is_retired() {
        return Err(IpdError::InvalidInput(format!("bed {} is retired", bed_id)));
    }
    if bed.status == BedStatus::Occupied {
        return Err(IpdError::BedUnavailable {
            bed_id,
            status: bed.status,
        });
    }
    if bed.status != status {
        bed.status = status;
        tx.update_bed(&bed)?;
    }
    Ok(bed)
}

/// Takes a bed out of service. Occupied beds cannot be retired. Retiring twice is a no-op.
pub fn retire(tx: &mut dyn StoreTx, bed_id: BedId, at: DateTime<Utc>) -> IpdResult<Bed> {
    let mut bed = tx
        .lock_bed(bed_id)?
        .ok_or_else(|| IpdError::not_found("bed", bed_id))?;
    if bed.status == BedStatus::Occupied {
        return Err(IpdError::BedUnavailable {
            bed_id,
            status: bed.status,
        });
    }
    if bed.retired_at.is_none() {
        bed.retired_at = Some(at);
        tx.update_bed(&bed)?;
    }
    Ok(bed)
}

/// Description of one bed to add to a ward.
#[derive(Clone, Debug)]
pub struct BedSpec {
    pub bed_number: NonEmptyText,
    pub bed_type: BedType,
    pub daily_rate_cents: i64,
}

/// Inserts new `Available` beds into a ward.
///
/// Holds the ward lock while checking bed numbers, so concurrent additions to the same ward
/// cannot create duplicates. Bed numbers must be unique within the ward.
pub fn add_beds(
    tx: &mut dyn StoreTx,
    ward_id: WardId,
    specs: Vec<BedSpec>,
    at: DateTime<Utc>,
) -> IpdResult<Vec<Bed>> {
    tx.lock_ward(ward_id)?
        .ok_or_else(|| IpdError::not_found("ward", ward_id))?;

    let mut taken: HashSet<NonEmptyText> = tx
        .beds_in_ward(ward_id)?
        .into_iter()
        .map(|b| b.bed_number)
        .collect();

    let mut beds = Vec::with_capacity(specs.len());
    for spec in specs {
        validate_daily_rate(spec.daily_rate_cents)?;
        if !taken.insert(spec.bed_number.clone()) {
            return Err(IpdError::InvalidInput(format!(
                "bed number {} already exists in ward {}",
                spec.bed_number, ward_id
            )));
        }
        let bed = Bed {
            id: BedId::new(),
            ward_id,
            bed_number: spec.bed_number,
            bed_type: spec.bed_type,
            status: BedStatus::Available,
            daily_rate_cents: spec.daily_rate_cents,
            retired_at: None,
            created_at: at,
        };
        tx.insert_bed(&bed)?;
        beds.push(bed);
    }
    Ok(beds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ward, WardStatus, WardType};
    use crate::store::{InpatientStore, MemoryStore};

    fn seed_ward(store: &MemoryStore) -> WardId {
        let ward = Ward {
            id: WardId::new(),
            facility_id: None,
            name: NonEmptyText::new("Surgical").unwrap(),
            code: NonEmptyText::new("SUR").unwrap(),
            ward_type: WardType::Surgical,
            status: WardStatus::Active,
            floor: None,
            description: None,
            total_beds: 0,
            occupied_beds: 0,
            created_at: Utc::now(),
        };
        let mut tx = store.begin().unwrap();
        tx.insert_ward(&ward).unwrap();
        tx.commit().unwrap();
        ward.id
    }

    fn spec(number: &str) -> BedSpec {
        BedSpec {
            bed_number: NonEmptyText::new(number).unwrap(),
            bed_type: BedType::Standard,
            daily_rate_cents: 150_000,
        }
    }

    fn seed_bed(store: &MemoryStore, ward_id: WardId) -> BedId {
        let mut tx = store.begin().unwrap();
        let beds = add_beds(&mut *tx, ward_id, vec![spec("S01")], Utc::now())
            .expect("add beds should succeed");
        tx.commit().unwrap();
        beds[0].id
    }

    #[test]
    fn test_claim_then_second_claim_is_unavailable() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        let bed = try_claim(&mut *tx, bed_id).expect("claim should succeed");
        assert_eq!(bed.status, BedStatus::Occupied);
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let err = try_claim(&mut *tx, bed_id).expect_err("second claim should fail");
        assert!(matches!(
            err,
            IpdError::BedUnavailable {
                status: BedStatus::Occupied,
                ..
            }
        ));
    }

    #[test]
    fn test_claim_in_wrong_ward_is_invalid() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        let err = try_claim_in_ward(&mut *tx, WardId::new(), bed_id)
            .expect_err("claim in other ward should fail");
        assert!(matches!(err, IpdError::InvalidInput(_)));
    }

    #[test]
    fn test_release_of_unoccupied_bed_is_invariant_violation() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        let err = release(&mut *tx, bed_id, BedStatus::Cleaning)
            .expect_err("release of available bed should fail");
        assert!(matches!(err, IpdError::InvariantViolation(_)));
    }

    #[test]
    fn test_cleaning_bed_returns_to_available_only_by_operational_action() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        try_claim(&mut *tx, bed_id).unwrap();
        let released = release(&mut *tx, bed_id, BedStatus::Cleaning).unwrap();
        assert_eq!(released.status, BedStatus::Cleaning);
        assert!(try_claim(&mut *tx, bed_id).is_err());

        let bed = set_operational_status(&mut *tx, bed_id, BedStatus::Available)
            .expect("status change should succeed");
        assert!(bed.is_claimable());
    }

    #[test]
    fn test_operational_status_refuses_occupied() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        assert!(matches!(
            set_operational_status(&mut *tx, bed_id, BedStatus::Occupied),
            Err(IpdError::InvalidInput(_))
        ));

        try_claim(&mut *tx, bed_id).unwrap();
        assert!(matches!(
            set_operational_status(&mut *tx, bed_id, BedStatus::Maintenance),
            Err(IpdError::BedUnavailable { .. })
        ));
    }

    #[test]
    fn test_retire_refuses_occupied_bed_and_blocks_claims() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        let bed_id = seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        try_claim(&mut *tx, bed_id).unwrap();
        assert!(retire(&mut *tx, bed_id, Utc::now()).is_err());
        release(&mut *tx, bed_id, BedStatus::Available).unwrap();

        let bed = retire(&mut *tx, bed_id, Utc::now()).expect("retire should succeed");
        assert!(bed.is_retired());
        assert!(matches!(
            try_claim(&mut *tx, bed_id),
            Err(IpdError::BedUnavailable { .. })
        ));
    }

    #[test]
    fn test_add_beds_rejects_duplicate_numbers() {
        let store = MemoryStore::default();
        let ward_id = seed_ward(&store);
        seed_bed(&store, ward_id);

        let mut tx = store.begin().unwrap();
        let err = add_beds(&mut *tx, ward_id, vec![spec("S01")], Utc::now())
            .expect_err("duplicate bed number should fail");
        assert!(matches!(err, IpdError::InvalidInput(_)));
    }

    #[test]
    fn test_add_beds_to_missing_ward_is_not_found() {
        let store = MemoryStore::default();
        let mut tx = store.begin().unwrap();
        let err = add_beds(&mut *tx, WardId::new(), vec![spec("X01")], Utc::now())
            .expect_err("missing ward should fail");
        assert!(matches!(err, IpdError::NotFound { entity: "ward", .. }));
    }
}
