//! HTTP handlers. Each one parses its input, runs one service call on the blocking pool and
//! converts the result.

use crate::dto::{
    parse_field, parse_opt, text, AdmissionListRes, AdmissionRes, AvailableBedsParams, BedRes,
    BedStatusReq, BulkBedsReq, CloseAdmissionReq, CreateAdmissionReq, CreateBedReq,
    CreateWardReq, CurrentAdmissionRes, HealthRes, ListAdmissionsParams, ListWardsParams,
    OccupancyParams, OccupancyRes, TransferReq, TransferRes, UpdateWardReq, WardRes,
};
use crate::{run_blocking, ApiErr, AppState};
use axum::{
    extract::{Path as AxumPath, Query, State},
    response::Json,
};
use ipd_core::constants::DEFAULT_PAGE_LIMIT;
use ipd_core::model::{
    AdmissionFilter, AdmissionRequest, AdmissionStatus, BulkBeds, NewBed, NewWard,
    TransferRequest, WardFilter, WardUpdate,
};
use ipd_core::{AdmissionId, BedId, PatientId, WardId};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used by monitoring and load balancer health checks. Does not touch the database.
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "IPD REST API is alive".into(),
    })
}

// Wards

#[utoipa::path(
    get,
    path = "/ipd/wards",
    params(
        ("facility_id" = Option<String>, Query, description = "Filter by facility"),
        ("ward_type" = Option<String>, Query, description = "Filter by ward type"),
        ("status" = Option<String>, Query, description = "Filter by ward status")
    ),
    responses(
        (status = 200, description = "Wards ordered by name", body = Vec<WardRes>),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    tag = "wards"
)]
#[axum::debug_handler]
pub(crate) async fn list_wards(
    State(state): State<AppState>,
    Query(params): Query<ListWardsParams>,
) -> Result<Json<Vec<WardRes>>, ApiErr> {
    let filter = WardFilter {
        facility_id: parse_opt("facility_id", params.facility_id.as_deref())?,
        ward_type: parse_opt("ward_type", params.ward_type.as_deref())?,
        status: parse_opt("status", params.status.as_deref())?,
    };
    let service = state.service.clone();
    let wards = run_blocking("List wards", move || service.list_wards(&filter)).await?;
    Ok(Json(wards.into_iter().map(WardRes::from).collect()))
}

#[utoipa::path(
    post,
    path = "/ipd/wards",
    request_body = CreateWardReq,
    responses(
        (status = 200, description = "Ward created", body = WardRes),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    tag = "wards"
)]
#[axum::debug_handler]
pub(crate) async fn create_ward(
    State(state): State<AppState>,
    Json(req): Json<CreateWardReq>,
) -> Result<Json<WardRes>, ApiErr> {
    let new = NewWard {
        facility_id: parse_opt("facility_id", req.facility_id.as_deref())?,
        name: text("name", &req.name)?,
        code: text("code", &req.code)?,
        ward_type: parse_field("ward_type", &req.ward_type)?,
        floor: req.floor,
        description: req.description,
    };
    let service = state.service.clone();
    let ward = run_blocking("Create ward", move || service.create_ward(new)).await?;
    Ok(Json(ward.into()))
}

#[utoipa::path(
    get,
    path = "/ipd/wards/{id}",
    params(("id" = String, Path, description = "Ward id")),
    responses(
        (status = 200, description = "Ward", body = WardRes),
        (status = 404, description = "Ward not found")
    ),
    tag = "wards"
)]
#[axum::debug_handler]
pub(crate) async fn get_ward(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<WardRes>, ApiErr> {
    let ward_id: WardId = parse_field("ward id", &id)?;
    let service = state.service.clone();
    let ward = run_blocking("Get ward", move || service.get_ward(ward_id)).await?;
    Ok(Json(ward.into()))
}

#[utoipa::path(
    put,
    path = "/ipd/wards/{id}",
    params(("id" = String, Path, description = "Ward id")),
    request_body = UpdateWardReq,
    responses(
        (status = 200, description = "Ward updated", body = WardRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Ward not found"),
        (status = 503, description = "Ward is locked, retry")
    ),
    tag = "wards"
)]
/// Update ward metadata
///
/// Bed counters are not part of the body; they always reflect the ward's beds.
#[axum::debug_handler]
pub(crate) async fn update_ward(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<UpdateWardReq>,
) -> Result<Json<WardRes>, ApiErr> {
    let ward_id: WardId = parse_field("ward id", &id)?;
    let update = WardUpdate {
        name: req.name.as_deref().map(|n| text("name", n)).transpose()?,
        code: req.code.as_deref().map(|c| text("code", c)).transpose()?,
        ward_type: parse_opt("ward_type", req.ward_type.as_deref())?,
        status: parse_opt("status", req.status.as_deref())?,
        floor: req.floor,
        description: req.description,
    };
    let service = state.service.clone();
    let ward = run_blocking("Update ward", move || service.update_ward(ward_id, update)).await?;
    Ok(Json(ward.into()))
}

#[utoipa::path(
    get,
    path = "/ipd/wards/{id}/beds",
    params(("id" = String, Path, description = "Ward id")),
    responses(
        (status = 200, description = "All beds of the ward, retired included", body = Vec<BedRes>),
        (status = 404, description = "Ward not found")
    ),
    tag = "wards"
)]
#[axum::debug_handler]
pub(crate) async fn list_ward_beds(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Vec<BedRes>>, ApiErr> {
    let ward_id: WardId = parse_field("ward id", &id)?;
    let service = state.service.clone();
    let beds = run_blocking("List ward beds", move || service.list_beds(ward_id)).await?;
    Ok(Json(beds.into_iter().map(BedRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/ipd/occupancy",
    params(("facility_id" = Option<String>, Query, description = "Restrict to one facility")),
    responses(
        (status = 200, description = "Occupancy per ward", body = Vec<OccupancyRes>),
        (status = 500, description = "Internal server error")
    ),
    tag = "wards"
)]
#[axum::debug_handler]
pub(crate) async fn ward_occupancy(
    State(state): State<AppState>,
    Query(params): Query<OccupancyParams>,
) -> Result<Json<Vec<OccupancyRes>>, ApiErr> {
    let facility_id = parse_opt("facility_id", params.facility_id.as_deref())?;
    let service = state.service.clone();
    let report = run_blocking("Ward occupancy", move || service.ward_occupancy(facility_id)).await?;
    Ok(Json(report.into_iter().map(OccupancyRes::from).collect()))
}

// Beds

#[utoipa::path(
    post,
    path = "/ipd/beds",
    request_body = CreateBedReq,
    responses(
        (status = 200, description = "Bed created", body = BedRes),
        (status = 400, description = "Bad request or duplicate bed number"),
        (status = 404, description = "Ward not found")
    ),
    tag = "beds"
)]
#[axum::debug_handler]
pub(crate) async fn create_bed(
    State(state): State<AppState>,
    Json(req): Json<CreateBedReq>,
) -> Result<Json<BedRes>, ApiErr> {
    let new = NewBed {
        ward_id: parse_field("ward_id", &req.ward_id)?,
        bed_number: text("bed_number", &req.bed_number)?,
        bed_type: parse_field("bed_type", &req.bed_type)?,
        daily_rate_cents: req.daily_rate_cents,
    };
    let service = state.service.clone();
    let bed = run_blocking("Create bed", move || service.create_bed(new)).await?;
    Ok(Json(bed.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/beds/bulk",
    request_body = BulkBedsReq,
    responses(
        (status = 200, description = "Beds created", body = Vec<BedRes>),
        (status = 400, description = "Bad request or duplicate bed number"),
        (status = 404, description = "Ward not found")
    ),
    tag = "beds"
)]
#[axum::debug_handler]
pub(crate) async fn bulk_create_beds(
    State(state): State<AppState>,
    Json(req): Json<BulkBedsReq>,
) -> Result<Json<Vec<BedRes>>, ApiErr> {
    let bulk = BulkBeds {
        ward_id: parse_field("ward_id", &req.ward_id)?,
        prefix: req.prefix,
        count: req.count,
        bed_type: parse_field("bed_type", &req.bed_type)?,
        daily_rate_cents: req.daily_rate_cents,
    };
    let service = state.service.clone();
    let beds = run_blocking("Bulk create beds", move || service.bulk_create_beds(bulk)).await?;
    Ok(Json(beds.into_iter().map(BedRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/ipd/beds/available",
    params(("ward_id" = Option<String>, Query, description = "Restrict to one ward")),
    responses(
        (status = 200, description = "Beds that can be claimed now", body = Vec<BedRes>)
    ),
    tag = "beds"
)]
#[axum::debug_handler]
pub(crate) async fn available_beds(
    State(state): State<AppState>,
    Query(params): Query<AvailableBedsParams>,
) -> Result<Json<Vec<BedRes>>, ApiErr> {
    let ward_id = parse_opt("ward_id", params.ward_id.as_deref())?;
    let service = state.service.clone();
    let beds = run_blocking("Available beds", move || service.available_beds(ward_id)).await?;
    Ok(Json(beds.into_iter().map(BedRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/ipd/beds/{id}",
    params(("id" = String, Path, description = "Bed id")),
    responses(
        (status = 200, description = "Bed", body = BedRes),
        (status = 404, description = "Bed not found")
    ),
    tag = "beds"
)]
#[axum::debug_handler]
pub(crate) async fn get_bed(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<BedRes>, ApiErr> {
    let bed_id: BedId = parse_field("bed id", &id)?;
    let service = state.service.clone();
    let bed = run_blocking("Get bed", move || service.get_bed(bed_id)).await?;
    Ok(Json(bed.into()))
}

#[utoipa::path(
    put,
    path = "/ipd/beds/{id}/status",
    params(("id" = String, Path, description = "Bed id")),
    request_body = BedStatusReq,
    responses(
        (status = 200, description = "Bed status changed", body = BedRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Bed not found"),
        (status = 409, description = "Bed is occupied"),
        (status = 503, description = "Bed is locked, retry")
    ),
    tag = "beds"
)]
/// Change a bed's operational status
///
/// Moves a bed between `available`, `reserved`, `maintenance` and `cleaning`. Occupancy is
/// only ever changed by admissions, discharges and transfers.
#[axum::debug_handler]
pub(crate) async fn set_bed_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<BedStatusReq>,
) -> Result<Json<BedRes>, ApiErr> {
    let bed_id: BedId = parse_field("bed id", &id)?;
    let status = parse_field("status", &req.status)?;
    let service = state.service.clone();
    let bed = run_blocking("Set bed status", move || service.set_bed_status(bed_id, status)).await?;
    Ok(Json(bed.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/beds/{id}/retire",
    params(("id" = String, Path, description = "Bed id")),
    responses(
        (status = 200, description = "Bed retired", body = BedRes),
        (status = 404, description = "Bed not found"),
        (status = 409, description = "Bed is occupied")
    ),
    tag = "beds"
)]
#[axum::debug_handler]
pub(crate) async fn retire_bed(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<BedRes>, ApiErr> {
    let bed_id: BedId = parse_field("bed id", &id)?;
    let service = state.service.clone();
    let bed = run_blocking("Retire bed", move || service.retire_bed(bed_id)).await?;
    Ok(Json(bed.into()))
}

// Admissions

#[utoipa::path(
    get,
    path = "/ipd/admissions",
    params(
        ("ward_id" = Option<String>, Query, description = "Filter by ward"),
        ("patient_id" = Option<String>, Query, description = "Filter by patient"),
        ("status" = Option<String>, Query, description = "Admission status, default `admitted`"),
        ("page" = Option<u32>, Query, description = "Page number, from 1"),
        ("limit" = Option<u32>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "Admissions, newest first", body = AdmissionListRes),
        (status = 400, description = "Bad request")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn list_admissions(
    State(state): State<AppState>,
    Query(params): Query<ListAdmissionsParams>,
) -> Result<Json<AdmissionListRes>, ApiErr> {
    let filter = AdmissionFilter {
        ward_id: parse_opt("ward_id", params.ward_id.as_deref())?,
        patient_id: parse_opt("patient_id", params.patient_id.as_deref())?,
        status: parse_opt("status", params.status.as_deref())?
            .unwrap_or(AdmissionStatus::Admitted),
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    };
    let (page, limit) = (filter.page, filter.limit);
    let service = state.service.clone();
    let result = run_blocking("List admissions", move || service.list_admissions(&filter)).await?;
    Ok(Json(AdmissionListRes {
        data: result.data.into_iter().map(AdmissionRes::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

#[utoipa::path(
    post,
    path = "/ipd/admissions",
    request_body = CreateAdmissionReq,
    responses(
        (status = 200, description = "Patient admitted", body = AdmissionRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient, encounter, staff, ward or bed not found"),
        (status = 409, description = "Bed unavailable or patient already admitted"),
        (status = 503, description = "Bed or sequence is locked, retry")
    ),
    tag = "admissions"
)]
/// Admit a patient to a bed
///
/// Mints the admission number, claims the bed and updates the ward counters atomically.
/// A bed that is not `available` gives 409 and nothing is written.
#[axum::debug_handler]
pub(crate) async fn create_admission(
    State(state): State<AppState>,
    Json(req): Json<CreateAdmissionReq>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let request = AdmissionRequest {
        facility_id: parse_opt("facility_id", req.facility_id.as_deref())?,
        patient_id: parse_field("patient_id", &req.patient_id)?,
        encounter_id: parse_field("encounter_id", &req.encounter_id)?,
        ward_id: parse_field("ward_id", &req.ward_id)?,
        bed_id: parse_field("bed_id", &req.bed_id)?,
        admission_type: parse_field("admission_type", &req.admission_type)?,
        admitted_by: parse_field("admitted_by", &req.admitted_by)?,
        attending_doctor_id: parse_opt("attending_doctor_id", req.attending_doctor_id.as_deref())?,
        admission_reason: text("admission_reason", &req.admission_reason)?,
        admission_diagnosis: req.admission_diagnosis,
    };
    let service = state.service.clone();
    let admission =
        run_blocking("Create admission", move || service.create_admission(request)).await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    get,
    path = "/ipd/admissions/{id}",
    params(("id" = String, Path, description = "Admission id")),
    responses(
        (status = 200, description = "Admission", body = AdmissionRes),
        (status = 404, description = "Admission not found")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn get_admission(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let service = state.service.clone();
    let admission = run_blocking("Get admission", move || service.get_admission(admission_id)).await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/admissions/{id}/discharge",
    params(("id" = String, Path, description = "Admission id")),
    request_body = CloseAdmissionReq,
    responses(
        (status = 200, description = "Patient discharged, bed sent to cleaning", body = AdmissionRes),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Admission is not active"),
        (status = 503, description = "Admission or bed is locked, retry")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn discharge_admission(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CloseAdmissionReq>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let request = req.into_domain()?;
    let service = state.service.clone();
    let admission = run_blocking("Discharge admission", move || {
        service.discharge_admission(admission_id, request)
    })
    .await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/admissions/{id}/abscond",
    params(("id" = String, Path, description = "Admission id")),
    request_body = CloseAdmissionReq,
    responses(
        (status = 200, description = "Abscondment recorded", body = AdmissionRes),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Admission is not active")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn record_abscondment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CloseAdmissionReq>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let request = req.into_domain()?;
    let service = state.service.clone();
    let admission = run_blocking("Record abscondment", move || {
        service.record_abscondment(admission_id, request)
    })
    .await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/admissions/{id}/death",
    params(("id" = String, Path, description = "Admission id")),
    request_body = CloseAdmissionReq,
    responses(
        (status = 200, description = "Death recorded", body = AdmissionRes),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Admission is not active")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn record_death(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CloseAdmissionReq>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let request = req.into_domain()?;
    let service = state.service.clone();
    let admission =
        run_blocking("Record death", move || service.record_death(admission_id, request)).await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    post,
    path = "/ipd/admissions/{id}/transfer",
    params(("id" = String, Path, description = "Admission id")),
    request_body = TransferReq,
    responses(
        (status = 200, description = "Patient moved to the destination bed", body = AdmissionRes),
        (status = 400, description = "Bad request or destination is the current bed"),
        (status = 404, description = "Admission or bed not found"),
        (status = 409, description = "Destination unavailable or admission not active"),
        (status = 503, description = "A bed is locked, retry")
    ),
    tag = "admissions"
)]
/// Transfer an admitted patient to another bed
///
/// On any failure the patient stays in their current bed and nothing is recorded.
#[axum::debug_handler]
pub(crate) async fn transfer_admission(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransferReq>,
) -> Result<Json<AdmissionRes>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let request = TransferRequest {
        to_ward_id: parse_field("to_ward_id", &req.to_ward_id)?,
        to_bed_id: parse_field("to_bed_id", &req.to_bed_id)?,
        reason: parse_field("reason", &req.reason)?,
        notes: req.notes,
        transferred_by: parse_field("transferred_by", &req.transferred_by)?,
    };
    let service = state.service.clone();
    let admission = run_blocking("Transfer admission", move || {
        service.transfer_admission(admission_id, request)
    })
    .await?;
    Ok(Json(admission.into()))
}

#[utoipa::path(
    get,
    path = "/ipd/admissions/{id}/transfers",
    params(("id" = String, Path, description = "Admission id")),
    responses(
        (status = 200, description = "Transfers, oldest first", body = Vec<TransferRes>),
        (status = 404, description = "Admission not found")
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn transfer_history(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Vec<TransferRes>>, ApiErr> {
    let admission_id: AdmissionId = parse_field("admission id", &id)?;
    let service = state.service.clone();
    let history =
        run_blocking("Transfer history", move || service.transfer_history(admission_id)).await?;
    Ok(Json(history.into_iter().map(TransferRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/ipd/patients/{id}/admission",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The patient's active admission, or null", body = CurrentAdmissionRes)
    ),
    tag = "admissions"
)]
#[axum::debug_handler]
pub(crate) async fn current_admission(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CurrentAdmissionRes>, ApiErr> {
    let patient_id: PatientId = parse_field("patient id", &id)?;
    let service = state.service.clone();
    let admission =
        run_blocking("Current admission", move || service.current_admission(patient_id)).await?;
    Ok(Json(CurrentAdmissionRes {
        admission: admission.map(AdmissionRes::from),
    }))
}
