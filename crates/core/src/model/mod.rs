//! Domain records of the inpatient core.
//!
//! Enumerations are stored as lowercase snake_case text (the same spelling serde uses), so a
//! value read back from storage or from an HTTP body parses with the same `FromStr`.

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::IpdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::IpdError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

mod admission;
mod bed;
mod ward;

pub use admission::{
    Admission, AdmissionFilter, AdmissionPage, AdmissionRequest, AdmissionState, AdmissionStatus,
    AdmissionType, BedTransfer, ClosureOutcome, DischargeDetails, DischargeRequest,
    EncounterStatus, Placement, TransferReason, TransferRequest,
};
pub use bed::{Bed, BedCounts, BedStatus, BedType, BulkBeds, NewBed};
pub use ward::{NewWard, Ward, WardFilter, WardOccupancy, WardStatus, WardType, WardUpdate};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enums_parse_their_own_spelling() {
        for status in BedStatus::ALL {
            assert_eq!(status.as_str().parse::<BedStatus>().unwrap(), *status);
        }
        for status in AdmissionStatus::ALL {
            assert_eq!(status.as_str().parse::<AdmissionStatus>().unwrap(), *status);
        }
        for reason in TransferReason::ALL {
            assert_eq!(reason.as_str().parse::<TransferReason>().unwrap(), *reason);
        }
    }

    #[test]
    fn test_text_enum_serde_matches_as_str() {
        let json = serde_json::to_string(&TransferReason::PatientRequest).unwrap();
        assert_eq!(json, "\"patient_request\"");
        assert_eq!(TransferReason::PatientRequest.as_str(), "patient_request");
    }

    #[test]
    fn test_text_enum_rejects_unknown_value() {
        assert!("vacant".parse::<BedStatus>().is_err());
    }
}
