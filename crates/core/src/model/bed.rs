use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::{BedId, WardId};
use serde::{Deserialize, Serialize};

text_enum!(
    /// Operational state of a physical bed.
    ///
    /// `Occupied` is only ever set by a successful claim and only ever cleared by a release;
    /// every other transition is an operational action.
    BedStatus {
        Available => "available",
        Occupied => "occupied",
        Reserved => "reserved",
        Maintenance => "maintenance",
        Cleaning => "cleaning",
    }
);

text_enum!(
    BedType {
        Standard => "standard",
        Private => "private",
        Icu => "icu",
        Pediatric => "pediatric",
        Maternity => "maternity",
        Isolation => "isolation",
    }
);

/// A schedulable physical bed, owned by exactly one ward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bed {
    pub id: BedId,
    pub ward_id: WardId,
    pub bed_number: NonEmptyText,
    pub bed_type: BedType,
    pub status: BedStatus,
    /// Daily charge in minor currency units.
    pub daily_rate_cents: i64,
    /// Set when the bed is soft-removed. Retired beds keep their history but are never claimed
    /// and do not count towards the ward total.
    pub retired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Bed {
    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }

    /// A bed can be claimed for an admission only while it is in service and available.
    pub fn is_claimable(&self) -> bool {
        !self.is_retired() && self.status == BedStatus::Available
    }
}

/// Input for creating a single bed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewBed {
    pub ward_id: WardId,
    pub bed_number: NonEmptyText,
    pub bed_type: BedType,
    #[serde(default)]
    pub daily_rate_cents: i64,
}

/// Input for creating `count` beds numbered `<prefix>01`, `<prefix>02`, ...
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkBeds {
    pub ward_id: WardId,
    #[serde(default)]
    pub prefix: String,
    pub count: u32,
    pub bed_type: BedType,
    #[serde(default)]
    pub daily_rate_cents: i64,
}

impl BulkBeds {
    /// Bed numbers this request produces, in order.
    pub fn bed_numbers(&self) -> Vec<String> {
        (1..=self.count)
            .map(|i| format!("{}{:02}", self.prefix, i))
            .collect()
    }
}

/// Source-of-truth counts behind a ward's denormalised counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BedCounts {
    /// Beds owned by the ward that are not retired.
    pub total: u32,
    /// Of those, beds whose status is `Occupied`.
    pub occupied: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_bed_numbers_are_zero_padded() {
        let bulk = BulkBeds {
            ward_id: WardId::new(),
            prefix: "A".into(),
            count: 3,
            bed_type: BedType::Standard,
            daily_rate_cents: 0,
        };
        assert_eq!(bulk.bed_numbers(), vec!["A01", "A02", "A03"]);
    }

    #[test]
    fn test_retired_bed_is_not_claimable() {
        let mut bed = Bed {
            id: BedId::new(),
            ward_id: WardId::new(),
            bed_number: NonEmptyText::new("B1").unwrap(),
            bed_type: BedType::Standard,
            status: BedStatus::Available,
            daily_rate_cents: 0,
            retired_at: None,
            created_at: Utc::now(),
        };
        assert!(bed.is_claimable());

        bed.retired_at = Some(Utc::now());
        assert!(!bed.is_claimable());
    }
}
