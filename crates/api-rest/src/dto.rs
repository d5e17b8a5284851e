//! Request and response bodies of the REST API.
//!
//! Identifiers travel as canonical 32-character lowercase hex strings and enumerations as their
//! snake_case names, for example `"icu"` or `"patient_request"`.

use crate::ApiErr;
use axum::http::StatusCode;
use ipd_core::model::{
    Admission, AdmissionState, Bed, BedTransfer, DischargeDetails, DischargeRequest, Ward,
    WardOccupancy,
};
use ipd_core::{IpdError, NonEmptyText};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Parses an identifier or enumeration from a request, answering 400 on failure.
pub(crate) fn parse_field<T>(field: &str, value: &str) -> Result<T, ApiErr>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    value.parse::<T>().map_err(|e| {
        tracing::warn!("invalid {}: {:?}", field, e);
        (StatusCode::BAD_REQUEST, "Invalid input")
    })
}

pub(crate) fn parse_opt<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ApiErr>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    value.map(|v| parse_field(field, v)).transpose()
}

pub(crate) fn text(field: &str, value: &str) -> Result<NonEmptyText, ApiErr> {
    NonEmptyText::new(value).map_err(|e| {
        tracing::warn!("invalid {}: {:?}", field, IpdError::from(e));
        (StatusCode::BAD_REQUEST, "Invalid input")
    })
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWardReq {
    pub facility_id: Option<String>,
    pub name: String,
    pub code: String,
    /// One of `general`, `pediatric`, `maternity`, `icu`, `surgical`, `private`, `isolation`.
    pub ward_type: String,
    pub floor: Option<i32>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateWardReq {
    pub name: Option<String>,
    pub code: Option<String>,
    pub ward_type: Option<String>,
    /// One of `active`, `inactive`, `maintenance`.
    pub status: Option<String>,
    /// Omit to keep, `null` to clear.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<i32>)]
    pub floor: Option<Option<i32>>,
    /// Omit to keep, `null` to clear.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WardRes {
    pub id: String,
    pub facility_id: Option<String>,
    pub name: String,
    pub code: String,
    pub ward_type: String,
    pub status: String,
    pub floor: Option<i32>,
    pub description: Option<String>,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub created_at: String,
}

impl From<Ward> for WardRes {
    fn from(ward: Ward) -> Self {
        Self {
            id: ward.id.to_string(),
            facility_id: ward.facility_id.map(|f| f.to_string()),
            name: ward.name.to_string(),
            code: ward.code.to_string(),
            ward_type: ward.ward_type.to_string(),
            status: ward.status.to_string(),
            floor: ward.floor,
            description: ward.description,
            total_beds: ward.total_beds,
            occupied_beds: ward.occupied_beds,
            created_at: ward.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OccupancyRes {
    pub ward_id: String,
    pub name: String,
    pub code: String,
    pub ward_type: String,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub unoccupied_beds: u32,
    /// Whole percent, rounded half up.
    pub occupancy_rate: u32,
}

impl From<WardOccupancy> for OccupancyRes {
    fn from(o: WardOccupancy) -> Self {
        Self {
            ward_id: o.ward_id.to_string(),
            name: o.name,
            code: o.code,
            ward_type: o.ward_type.to_string(),
            total_beds: o.total_beds,
            occupied_beds: o.occupied_beds,
            unoccupied_beds: o.unoccupied_beds,
            occupancy_rate: o.occupancy_rate,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBedReq {
    pub ward_id: String,
    pub bed_number: String,
    /// One of `standard`, `private`, `icu`, `pediatric`, `maternity`, `isolation`.
    pub bed_type: String,
    #[serde(default)]
    pub daily_rate_cents: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkBedsReq {
    pub ward_id: String,
    /// Prepended to the two-digit bed counter, e.g. `A-` gives `A-01`.
    #[serde(default)]
    pub prefix: String,
    pub count: u32,
    pub bed_type: String,
    #[serde(default)]
    pub daily_rate_cents: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BedStatusReq {
    /// One of `available`, `reserved`, `maintenance`, `cleaning`.
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BedRes {
    pub id: String,
    pub ward_id: String,
    pub bed_number: String,
    pub bed_type: String,
    pub status: String,
    pub daily_rate_cents: i64,
    pub retired_at: Option<String>,
    pub created_at: String,
}

impl From<Bed> for BedRes {
    fn from(bed: Bed) -> Self {
        Self {
            id: bed.id.to_string(),
            ward_id: bed.ward_id.to_string(),
            bed_number: bed.bed_number.to_string(),
            bed_type: bed.bed_type.to_string(),
            status: bed.status.to_string(),
            daily_rate_cents: bed.daily_rate_cents,
            retired_at: bed.retired_at.map(|t| t.to_rfc3339()),
            created_at: bed.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAdmissionReq {
    pub facility_id: Option<String>,
    pub patient_id: String,
    pub encounter_id: String,
    pub ward_id: String,
    pub bed_id: String,
    /// One of `elective`, `emergency`, `transfer`.
    pub admission_type: String,
    pub admitted_by: String,
    pub attending_doctor_id: Option<String>,
    pub admission_reason: String,
    pub admission_diagnosis: Option<String>,
}

/// Body of discharge, abscondment and death.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseAdmissionReq {
    pub closed_by: String,
    pub summary: Option<String>,
    pub diagnosis: Option<String>,
    pub instructions: Option<String>,
}

impl CloseAdmissionReq {
    pub(crate) fn into_domain(self) -> Result<DischargeRequest, ApiErr> {
        Ok(DischargeRequest {
            closed_by: parse_field("closed_by", &self.closed_by)?,
            details: DischargeDetails {
                summary: self.summary,
                diagnosis: self.diagnosis,
                instructions: self.instructions,
            },
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferReq {
    pub to_ward_id: String,
    pub to_bed_id: String,
    /// One of `clinical`, `patient_request`, `bed_management`, `isolation`, `step_down`,
    /// `step_up`.
    pub reason: String,
    pub notes: Option<String>,
    pub transferred_by: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdmissionRes {
    pub id: String,
    pub admission_number: String,
    pub facility_id: Option<String>,
    pub patient_id: String,
    pub encounter_id: String,
    pub admission_type: String,
    /// `admitted`, `discharged`, `absconded` or `deceased`.
    pub status: String,
    /// Current ward while admitted, last ward once closed.
    pub ward_id: String,
    pub bed_id: String,
    pub admitted_at: String,
    pub admitted_by: String,
    pub attending_doctor_id: Option<String>,
    pub admission_reason: String,
    pub admission_diagnosis: Option<String>,
    pub transfer_count: u32,
    pub closed_at: Option<String>,
    pub closed_by: Option<String>,
    pub discharge_summary: Option<String>,
    pub discharge_diagnosis: Option<String>,
    pub discharge_instructions: Option<String>,
}

impl From<Admission> for AdmissionRes {
    fn from(admission: Admission) -> Self {
        let status = admission.status().to_string();
        let placement = admission.placement();
        let (closed_at, closed_by, details) = match admission.state {
            AdmissionState::Active { .. } => (None, None, DischargeDetails::default()),
            AdmissionState::Closed {
                closed_at,
                closed_by,
                details,
                ..
            } => (
                Some(closed_at.to_rfc3339()),
                Some(closed_by.to_string()),
                details,
            ),
        };
        Self {
            id: admission.id.to_string(),
            admission_number: admission.admission_number,
            facility_id: admission.facility_id.map(|f| f.to_string()),
            patient_id: admission.patient_id.to_string(),
            encounter_id: admission.encounter_id.to_string(),
            admission_type: admission.admission_type.to_string(),
            status,
            ward_id: placement.ward_id.to_string(),
            bed_id: placement.bed_id.to_string(),
            admitted_at: admission.admitted_at.to_rfc3339(),
            admitted_by: admission.admitted_by.to_string(),
            attending_doctor_id: admission.attending_doctor_id.map(|s| s.to_string()),
            admission_reason: admission.admission_reason.to_string(),
            admission_diagnosis: admission.admission_diagnosis,
            transfer_count: admission.transfer_count,
            closed_at,
            closed_by,
            discharge_summary: details.summary,
            discharge_diagnosis: details.diagnosis,
            discharge_instructions: details.instructions,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdmissionListRes {
    pub data: Vec<AdmissionRes>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferRes {
    pub id: String,
    pub admission_id: String,
    pub from_ward_id: String,
    pub from_bed_id: String,
    pub to_ward_id: String,
    pub to_bed_id: String,
    pub reason: String,
    pub notes: Option<String>,
    pub transferred_at: String,
    pub transferred_by: String,
}

impl From<BedTransfer> for TransferRes {
    fn from(t: BedTransfer) -> Self {
        Self {
            id: t.id.to_string(),
            admission_id: t.admission_id.to_string(),
            from_ward_id: t.from.ward_id.to_string(),
            from_bed_id: t.from.bed_id.to_string(),
            to_ward_id: t.to.ward_id.to_string(),
            to_bed_id: t.to.bed_id.to_string(),
            reason: t.reason.to_string(),
            notes: t.notes,
            transferred_at: t.transferred_at.to_rfc3339(),
            transferred_by: t.transferred_by.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentAdmissionRes {
    pub admission: Option<AdmissionRes>,
}

/// Query string of `GET /ipd/wards`.
#[derive(Debug, Default, Deserialize)]
pub struct ListWardsParams {
    pub facility_id: Option<String>,
    pub ward_type: Option<String>,
    pub status: Option<String>,
}

/// Query string of `GET /ipd/occupancy`.
#[derive(Debug, Default, Deserialize)]
pub struct OccupancyParams {
    pub facility_id: Option<String>,
}

/// Query string of `GET /ipd/beds/available`.
#[derive(Debug, Default, Deserialize)]
pub struct AvailableBedsParams {
    pub ward_id: Option<String>,
}

/// Query string of `GET /ipd/admissions`.
#[derive(Debug, Default, Deserialize)]
pub struct ListAdmissionsParams {
    pub ward_id: Option<String>,
    pub patient_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
