//! Typed identifiers, one per record kind.

use crate::{RecordId, Uuid, UuidError, UuidResult};
use std::{fmt, str::FromStr};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(RecordId);

        impl $name {
            /// Generates a new random identifier.
            pub fn new() -> Self {
                Self(RecordId::new())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(RecordId::from_uuid(uuid))
            }

            /// Parses a canonical (32 lowercase hex) identifier.
            pub fn parse(input: &str) -> UuidResult<Self> {
                RecordId::parse(input).map(Self)
            }

            pub fn uuid(&self) -> Uuid {
                self.0.uuid()
            }

            pub fn record_id(&self) -> RecordId {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

record_id!(
    /// Identifies a facility (hospital site). Wards optionally belong to one.
    FacilityId
);
record_id!(
    /// Identifies a ward.
    WardId
);
record_id!(
    /// Identifies a physical bed.
    BedId
);
record_id!(
    /// Identifies an admission record.
    AdmissionId
);
record_id!(
    /// Identifies an append-only bed transfer record.
    TransferId
);
record_id!(
    /// Identifies a patient in the registration collaborator.
    PatientId
);
record_id!(
    /// Identifies an encounter (visit) in the encounter collaborator.
    EncounterId
);
record_id!(
    /// Identifies a staff member (admitting, attending, discharging).
    StaffId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_ids_order_by_uuid() {
        let low = BedId::parse("00000000000000000000000000000001").unwrap();
        let high = BedId::parse("ff000000000000000000000000000000").unwrap();

        let mut ids = vec![high, low];
        ids.sort();
        assert_eq!(ids, vec![low, high]);
    }

    #[test]
    fn test_typed_id_serializes_transparently() {
        let ward = WardId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&ward).expect("serialize should succeed");

        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");
        let back: WardId = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, ward);
    }

    #[test]
    fn test_typed_id_rejects_non_canonical_input() {
        assert!("550e8400-e29b-41d4-a716-446655440000"
            .parse::<AdmissionId>()
            .is_err());
    }
}
