//! # API REST
//!
//! REST API implementation for the inpatient core.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, CORS, mapping errors to status codes)
//!
//! All domain work is done by [`ipd_core::InpatientService`]. The core is synchronous and holds
//! database connections while it waits on row locks, so every call runs on tokio's blocking
//! pool.

#![warn(rust_2018_idioms)]

pub mod dto;
mod handlers;

use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use ipd_core::{InpatientService, IpdError, IpdResult};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Error half of every handler result: a status code and a short, stable message.
pub type ApiErr = (StatusCode, &'static str);

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: InpatientService,
}

impl AppState {
    pub fn new(service: InpatientService) -> Self {
        Self { service }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_wards,
        handlers::create_ward,
        handlers::get_ward,
        handlers::update_ward,
        handlers::list_ward_beds,
        handlers::ward_occupancy,
        handlers::create_bed,
        handlers::bulk_create_beds,
        handlers::available_beds,
        handlers::get_bed,
        handlers::set_bed_status,
        handlers::retire_bed,
        handlers::list_admissions,
        handlers::create_admission,
        handlers::get_admission,
        handlers::discharge_admission,
        handlers::record_abscondment,
        handlers::record_death,
        handlers::transfer_admission,
        handlers::transfer_history,
        handlers::current_admission,
    ),
    components(schemas(
        dto::HealthRes,
        dto::CreateWardReq,
        dto::UpdateWardReq,
        dto::WardRes,
        dto::OccupancyRes,
        dto::CreateBedReq,
        dto::BulkBedsReq,
        dto::BedStatusReq,
        dto::BedRes,
        dto::CreateAdmissionReq,
        dto::CloseAdmissionReq,
        dto::TransferReq,
        dto::AdmissionRes,
        dto::AdmissionListRes,
        dto::TransferRes,
        dto::CurrentAdmissionRes,
    )),
    tags(
        (name = "wards"),
        (name = "beds"),
        (name = "admissions"),
    )
)]
pub struct ApiDoc;

/// Builds the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/ipd/wards",
            get(handlers::list_wards).post(handlers::create_ward),
        )
        .route(
            "/ipd/wards/:id",
            get(handlers::get_ward).put(handlers::update_ward),
        )
        .route("/ipd/wards/:id/beds", get(handlers::list_ward_beds))
        .route("/ipd/occupancy", get(handlers::ward_occupancy))
        .route("/ipd/beds", post(handlers::create_bed))
        .route("/ipd/beds/bulk", post(handlers::bulk_create_beds))
        .route("/ipd/beds/available", get(handlers::available_beds))
        .route("/ipd/beds/:id", get(handlers::get_bed))
        .route("/ipd/beds/:id/status", put(handlers::set_bed_status))
        .route("/ipd/beds/:id/retire", post(handlers::retire_bed))
        .route(
            "/ipd/admissions",
            get(handlers::list_admissions).post(handlers::create_admission),
        )
        .route("/ipd/admissions/:id", get(handlers::get_admission))
        .route(
            "/ipd/admissions/:id/discharge",
            post(handlers::discharge_admission),
        )
        .route(
            "/ipd/admissions/:id/abscond",
            post(handlers::record_abscondment),
        )
        .route("/ipd/admissions/:id/death", post(handlers::record_death))
        .route(
            "/ipd/admissions/:id/transfer",
            post(handlers::transfer_admission),
        )
        .route(
            "/ipd/admissions/:id/transfers",
            get(handlers::transfer_history),
        )
        .route(
            "/ipd/patients/:id/admission",
            get(handlers::current_admission),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps a core error to a response, logging it.
///
/// Conflicts and not-found are expected outcomes and logged at `warn`; everything else is an
/// `error`.
pub fn status_for(context: &str, e: IpdError) -> ApiErr {
    let (status, message) = match &e {
        IpdError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
        IpdError::BedUnavailable { .. } => (StatusCode::CONFLICT, "Bed is not available"),
        IpdError::NotAdmitted { .. } => (StatusCode::CONFLICT, "Admission is not active"),
        IpdError::PatientAlreadyAdmitted { .. } => {
            (StatusCode::CONFLICT, "Patient already has an active admission")
        }
        IpdError::SequenceExhausted { .. } => {
            (StatusCode::CONFLICT, "Admission numbers exhausted for today")
        }
        IpdError::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "Busy, retry"),
        IpdError::InvalidInput(_) | IpdError::Text(_) | IpdError::Uuid(_) => {
            (StatusCode::BAD_REQUEST, "Invalid input")
        }
        IpdError::InvariantViolation(_)
        | IpdError::Postgres(_)
        | IpdError::Pool(_)
        | IpdError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    };
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!("{} error: {:?}", context, e);
    } else {
        tracing::warn!("{} error: {:?}", context, e);
    }
    (status, message)
}

/// Runs a core call on the blocking pool and maps its error.
pub(crate) async fn run_blocking<T, F>(context: &'static str, f: F) -> Result<T, ApiErr>
where
    F: FnOnce() -> IpdResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| status_for(context, e)),
        Err(e) => {
            tracing::error!("{} task error: {:?}", context, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::FixedOffset;
    use http_body_util::BodyExt;
    use ipd_core::{
        CoreConfig, EncounterId, MemoryStore, PatientId, SequencePrefix, StaffId,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        staff: StaffId,
    }

    fn test_app() -> TestApp {
        let cfg = CoreConfig::new(
            Duration::from_secs(5),
            SequencePrefix::new("ADM").unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
        .expect("config should be valid");
        let store = Arc::new(MemoryStore::from_config(&cfg));
        let staff = StaffId::new();
        store.register_staff(staff).unwrap();
        let service = InpatientService::new(Arc::new(cfg), store.clone());
        TestApp {
            router: router(AppState::new(service)),
            store,
            staff,
        }
    }

    impl TestApp {
        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json");
            let request = match body {
                Some(body) => request.body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .expect("request should build");

            let response = self
                .router
                .clone()
                .oneshot(request)
                .await
                .expect("router should respond");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body should read")
                .to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn ward_with_beds(&self, code: &str, count: u32) -> (String, Vec<String>) {
            let (status, ward) = self
                .call(
                    Method::POST,
                    "/ipd/wards",
                    Some(json!({"name": code, "code": code, "ward_type": "general"})),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let ward_id = ward["id"].as_str().unwrap().to_string();

            let (status, beds) = self
                .call(
                    Method::POST,
                    "/ipd/beds/bulk",
                    Some(json!({
                        "ward_id": ward_id,
                        "prefix": format!("{}-", code),
                        "count": count,
                        "bed_type": "standard",
                        "daily_rate_cents": 250_000
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let bed_ids = beds
                .as_array()
                .unwrap()
                .iter()
                .map(|b| b["id"].as_str().unwrap().to_string())
                .collect();
            (ward_id, bed_ids)
        }

        fn admission_body(&self, ward_id: &str, bed_id: &str) -> Value {
            let patient = PatientId::new();
            let encounter = EncounterId::new();
            self.store.register_patient(patient).unwrap();
            self.store.register_encounter(encounter).unwrap();
            json!({
                "patient_id": patient.to_string(),
                "encounter_id": encounter.to_string(),
                "ward_id": ward_id,
                "bed_id": bed_id,
                "admission_type": "emergency",
                "admitted_by": self.staff.to_string(),
                "admission_reason": "chest pain"
            })
        }
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let app = test_app();
        let (status, body) = app.call(Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_admit_discharge_round_trip_updates_occupancy() {
        let app = test_app();
        let (ward_id, beds) = app.ward_with_beds("GEN", 2).await;

        let (status, admission) = app
            .call(
                Method::POST,
                "/ipd/admissions",
                Some(app.admission_body(&ward_id, &beds[0])),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(admission["status"], "admitted");
        assert_eq!(admission["bed_id"], beds[0].as_str());
        let number = admission["admission_number"].as_str().unwrap();
        assert!(number.starts_with("ADM"));
        assert!(number.ends_with("0001"));

        let (_, ward) = app
            .call(Method::GET, &format!("/ipd/wards/{}", ward_id), None)
            .await;
        assert_eq!(ward["total_beds"], 2);
        assert_eq!(ward["occupied_beds"], 1);

        let (_, report) = app.call(Method::GET, "/ipd/occupancy", None).await;
        assert_eq!(report[0]["occupancy_rate"], 50);
        assert_eq!(report[0]["unoccupied_beds"], 1);

        let admission_id = admission["id"].as_str().unwrap();
        let (status, closed) = app
            .call(
                Method::POST,
                &format!("/ipd/admissions/{}/discharge", admission_id),
                Some(json!({"closed_by": app.staff.to_string(), "summary": "stable"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "discharged");
        assert_eq!(closed["discharge_summary"], "stable");

        let (_, bed) = app
            .call(Method::GET, &format!("/ipd/beds/{}", beds[0]), None)
            .await;
        assert_eq!(bed["status"], "cleaning");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/ipd/admissions/{}/discharge", admission_id),
                Some(json!({"closed_by": app.staff.to_string()})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_occupied_bed_is_conflict() {
        let app = test_app();
        let (ward_id, beds) = app.ward_with_beds("ICU", 1).await;

        let (status, _) = app
            .call(
                Method::POST,
                "/ipd/admissions",
                Some(app.admission_body(&ward_id, &beds[0])),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                "/ipd/admissions",
                Some(app.admission_body(&ward_id, &beds[0])),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, Value::Null);

        let (_, available) = app
            .call(
                Method::GET,
                &format!("/ipd/beds/available?ward_id={}", ward_id),
                None,
            )
            .await;
        assert!(available.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_and_history() {
        let app = test_app();
        let (from_ward, from_beds) = app.ward_with_beds("MED", 1).await;
        let (to_ward, to_beds) = app.ward_with_beds("SUR", 1).await;

        let (_, admission) = app
            .call(
                Method::POST,
                "/ipd/admissions",
                Some(app.admission_body(&from_ward, &from_beds[0])),
            )
            .await;
        let admission_id = admission["id"].as_str().unwrap();

        let (status, moved) = app
            .call(
                Method::POST,
                &format!("/ipd/admissions/{}/transfer", admission_id),
                Some(json!({
                    "to_ward_id": to_ward,
                    "to_bed_id": to_beds[0],
                    "reason": "step_up",
                    "transferred_by": app.staff.to_string()
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["ward_id"], to_ward.as_str());
        assert_eq!(moved["transfer_count"], 1);

        let (_, history) = app
            .call(
                Method::GET,
                &format!("/ipd/admissions/{}/transfers", admission_id),
                None,
            )
            .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["from_bed_id"], from_beds[0].as_str());
        assert_eq!(history[0]["reason"], "step_up");

        let (_, source) = app
            .call(Method::GET, &format!("/ipd/wards/{}", from_ward), None)
            .await;
        assert_eq!(source["occupied_beds"], 0);
    }

    #[tokio::test]
    async fn test_bad_ids_and_unknown_rows() {
        let app = test_app();

        let (status, _) = app.call(Method::GET, "/ipd/wards/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = ipd_core::WardId::new();
        let (status, _) = app
            .call(Method::GET, &format!("/ipd/wards/{}", missing), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                Method::POST,
                "/ipd/wards",
                Some(json!({"name": "X", "code": "X", "ward_type": "galaxy"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_admissions_pages() {
        let app = test_app();
        let (ward_id, beds) = app.ward_with_beds("OBS", 3).await;
        for bed in &beds {
            let (status, _) = app
                .call(
                    Method::POST,
                    "/ipd/admissions",
                    Some(app.admission_body(&ward_id, bed)),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, page) = app
            .call(
                Method::GET,
                &format!("/ipd/admissions?ward_id={}&page=1&limit=2", ward_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 3);
        assert_eq!(page["data"].as_array().unwrap().len(), 2);

        let (status, _) = app
            .call(Method::GET, "/ipd/admissions?limit=0", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_ward_null_clears_and_absent_keeps() {
        let app = test_app();
        let (status, ward) = app
            .call(
                Method::POST,
                "/ipd/wards",
                Some(json!({
                    "name": "Maternity",
                    "code": "MAT",
                    "ward_type": "maternity",
                    "floor": 3,
                    "description": "north wing"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let uri = format!("/ipd/wards/{}", ward["id"].as_str().unwrap());

        let (status, updated) = app
            .call(Method::PUT, &uri, Some(json!({"floor": null})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["floor"], Value::Null);
        assert_eq!(updated["description"], "north wing");
    }

    #[tokio::test]
    async fn test_current_admission_is_null_when_not_admitted() {
        let app = test_app();
        let (status, body) = app
            .call(
                Method::GET,
                &format!("/ipd/patients/{}/admission", PatientId::new()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admission"], Value::Null);
    }
}
