use crate::constants::DEFAULT_PAGE_LIMIT;
use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::{
    AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, TransferId, WardId,
};
use serde::{Deserialize, Serialize};

text_enum!(
    AdmissionType {
        Elective => "elective",
        Emergency => "emergency",
        Transfer => "transfer",
    }
);

text_enum!(
    /// Flat status of an admission, derived from [`AdmissionState`] for queries and storage.
    ///
    /// There is no "transferred" status: a transfer moves an active admission to another bed.
    AdmissionStatus {
        Admitted => "admitted",
        Discharged => "discharged",
        Absconded => "absconded",
        Deceased => "deceased",
    }
);

text_enum!(
    /// How an admission ended.
    ClosureOutcome {
        Discharged => "discharged",
        Absconded => "absconded",
        Deceased => "deceased",
    }
);

impl ClosureOutcome {
    pub fn status(&self) -> AdmissionStatus {
        match self {
            ClosureOutcome::Discharged => AdmissionStatus::Discharged,
            ClosureOutcome::Absconded => AdmissionStatus::Absconded,
            ClosureOutcome::Deceased => AdmissionStatus::Deceased,
        }
    }
}

text_enum!(
    TransferReason {
        Clinical => "clinical",
        PatientRequest => "patient_request",
        BedManagement => "bed_management",
        Isolation => "isolation",
        StepDown => "step_down",
        StepUp => "step_up",
    }
);

text_enum!(
    /// Encounter statuses written by this crate to the encounter collaborator.
    EncounterStatus {
        Admitted => "admitted",
        Completed => "completed",
    }
);

/// Where an admitted patient is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub ward_id: WardId,
    pub bed_id: BedId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargeDetails {
    pub summary: Option<String>,
    pub diagnosis: Option<String>,
    pub instructions: Option<String>,
}

/// Lifecycle state of an admission.
///
/// An active admission always has a placement. A closed one keeps the placement it ended in,
/// but its bed is no longer held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdmissionState {
    Active {
        placement: Placement,
    },
    Closed {
        outcome: ClosureOutcome,
        last_placement: Placement,
        closed_at: DateTime<Utc>,
        closed_by: StaffId,
        details: DischargeDetails,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub id: AdmissionId,
    pub admission_number: String,
    pub facility_id: Option<FacilityId>,
    pub patient_id: PatientId,
    pub encounter_id: EncounterId,
    pub admission_type: AdmissionType,
    pub admitted_at: DateTime<Utc>,
    pub admitted_by: StaffId,
    pub attending_doctor_id: Option<StaffId>,
    pub admission_reason: NonEmptyText,
    pub admission_diagnosis: Option<String>,
    pub transfer_count: u32,
    pub state: AdmissionState,
}

impl Admission {
    pub fn status(&self) -> AdmissionStatus {
        match &self.state {
            AdmissionState::Active { .. } => AdmissionStatus::Admitted,
            AdmissionState::Closed { outcome, .. } => outcome.status(),
        }
    }

    /// Current placement while active, or the last one once closed.
    pub fn placement(&self) -> Placement {
        match &self.state {
            AdmissionState::Active { placement } => *placement,
            AdmissionState::Closed { last_placement, .. } => *last_placement,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AdmissionState::Active { .. })
    }

    /// Placement held by an active admission, `None` once closed.
    pub fn active_placement(&self) -> Option<Placement> {
        match &self.state {
            AdmissionState::Active { placement } => Some(*placement),
            AdmissionState::Closed { .. } => None,
        }
    }
}

/// Input for admitting a patient to a specific bed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionRequest {
    #[serde(default)]
    pub facility_id: Option<FacilityId>,
    pub patient_id: PatientId,
    pub encounter_id: EncounterId,
    pub ward_id: WardId,
    pub bed_id: BedId,
    pub admission_type: AdmissionType,
    pub admitted_by: StaffId,
    #[serde(default)]
    pub attending_doctor_id: Option<StaffId>,
    pub admission_reason: NonEmptyText,
    #[serde(default)]
    pub admission_diagnosis: Option<String>,
}

/// Input shared by discharge, abscondment and death.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DischargeRequest {
    pub closed_by: StaffId,
    #[serde(default)]
    pub details: DischargeDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub to_ward_id: WardId,
    pub to_bed_id: BedId,
    pub reason: TransferReason,
    #[serde(default)]
    pub notes: Option<String>,
    pub transferred_by: StaffId,
}

/// Append-only record of one bed move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedTransfer {
    pub id: TransferId,
    pub admission_id: AdmissionId,
    pub from: Placement,
    pub to: Placement,
    pub reason: TransferReason,
    pub notes: Option<String>,
    pub transferred_at: DateTime<Utc>,
    pub transferred_by: StaffId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionFilter {
    pub ward_id: Option<WardId>,
    pub patient_id: Option<PatientId>,
    /// Defaults to `Admitted`.
    pub status: AdmissionStatus,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for AdmissionFilter {
    fn default() -> Self {
        Self {
            ward_id: None,
            patient_id: None,
            status: AdmissionStatus::Admitted,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl AdmissionFilter {
    pub fn matches(&self, admission: &Admission) -> bool {
        admission.status() == self.status
            && self
                .ward_id
                .map_or(true, |w| admission.placement().ward_id == w)
            && self.patient_id.map_or(true, |p| admission.patient_id == p)
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

/// One page of admissions plus the total number matching the filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionPage {
    pub data: Vec<Admission>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(state: AdmissionState) -> Admission {
        Admission {
            id: AdmissionId::new(),
            admission_number: "ADM202401150001".into(),
            facility_id: None,
            patient_id: PatientId::new(),
            encounter_id: EncounterId::new(),
            admission_type: AdmissionType::Emergency,
            admitted_at: Utc::now(),
            admitted_by: StaffId::new(),
            attending_doctor_id: None,
            admission_reason: NonEmptyText::new("chest pain").unwrap(),
            admission_diagnosis: None,
            transfer_count: 0,
            state,
        }
    }

    #[test]
    fn test_status_is_derived_from_state() {
        let placement = Placement {
            ward_id: WardId::new(),
            bed_id: BedId::new(),
        };
        let active = admission(AdmissionState::Active { placement });
        assert_eq!(active.status(), AdmissionStatus::Admitted);
        assert_eq!(active.active_placement(), Some(placement));

        let closed = admission(AdmissionState::Closed {
            outcome: ClosureOutcome::Deceased,
            last_placement: placement,
            closed_at: Utc::now(),
            closed_by: StaffId::new(),
            details: DischargeDetails::default(),
        });
        assert_eq!(closed.status(), AdmissionStatus::Deceased);
        assert!(!closed.is_active());
        assert_eq!(closed.placement(), placement);
        assert_eq!(closed.active_placement(), None);
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let state = AdmissionState::Active {
            placement: Placement {
                ward_id: WardId::new(),
                bed_id: BedId::new(),
            },
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "active");
        assert!(json["placement"]["bed_id"].is_string());
    }

    #[test]
    fn test_filter_offset() {
        let filter = AdmissionFilter {
            page: 3,
            limit: 20,
            ..AdmissionFilter::default()
        };
        assert_eq!(filter.offset(), 40);
    }
}
