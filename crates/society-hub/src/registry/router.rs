use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::{
    BillDraft, BillId, ComplaintDraft, ComplaintId, ComplaintStatus, FaqDraft, RegistryError,
    RegistryService, ResidentDraft, ResidentId, SocietyDraft, SocietyId, VehicleDraft, VehicleId,
};
use crate::actors::{context_from_headers, ActorContext, ActorDirectory};
use crate::polls::RepositoryError;

const DEFAULT_FAQ_LIMIT: usize = 5;

#[derive(Clone)]
struct RegistryRouterState {
    service: Arc<RegistryService>,
    directory: Arc<dyn ActorDirectory>,
}

impl RegistryRouterState {
    fn context(&self, headers: &HeaderMap) -> Result<ActorContext, RegistryError> {
        Ok(context_from_headers(self.directory.as_ref(), headers)?)
    }
}

type Handled = Result<Response, RegistryError>;

/// Router exposing the society, resident, vehicle, billing, complaint and FAQ endpoints.
pub fn registry_router(
    service: Arc<RegistryService>,
    directory: Arc<dyn ActorDirectory>,
) -> Router {
    Router::new()
        .route("/api/v1/societies", get(list_societies).post(create_society))
        .route(
            "/api/v1/societies/:society_id",
            get(get_society).put(update_society).delete(delete_society),
        )
        .route(
            "/api/v1/societies/:society_id/residents",
            get(list_residents).post(create_resident),
        )
        .route(
            "/api/v1/residents/:resident_id",
            get(get_resident)
                .put(update_resident)
                .delete(delete_resident),
        )
        .route(
            "/api/v1/residents/:resident_id/vehicles",
            get(list_vehicles).post(add_vehicle),
        )
        .route(
            "/api/v1/vehicles/:vehicle_id",
            put(update_vehicle).delete(delete_vehicle),
        )
        .route("/api/v1/vehicles/:vehicle_id/primary", post(set_primary_vehicle))
        .route(
            "/api/v1/societies/:society_id/bills",
            get(list_bills).post(create_bill),
        )
        .route("/api/v1/societies/:society_id/bills/stats", get(bill_stats))
        .route("/api/v1/bills/:bill_id", axum::routing::delete(delete_bill))
        .route("/api/v1/bills/:bill_id/payment", post(pay_bill))
        .route(
            "/api/v1/societies/:society_id/complaints",
            get(list_complaints).post(file_complaint),
        )
        .route(
            "/api/v1/societies/:society_id/complaints/stats",
            get(complaint_stats),
        )
        .route(
            "/api/v1/complaints/:complaint_id",
            axum::routing::delete(delete_complaint),
        )
        .route(
            "/api/v1/complaints/:complaint_id/status",
            post(update_complaint_status).patch(update_complaint_status),
        )
        .route("/api/v1/faqs", get(list_faqs).post(add_faq))
        .route("/api/v1/faqs/:faq_id", put(update_faq).delete(remove_faq))
        .with_state(RegistryRouterState { service, directory })
}

fn ok<T: serde::Serialize>(status: StatusCode, body: T) -> Handled {
    Ok((status, Json(body)).into_response())
}

async fn list_societies(State(state): State<RegistryRouterState>, headers: HeaderMap) -> Handled {
    let ctx = state.context(&headers)?;
    ok(StatusCode::OK, state.service.list_societies(&ctx)?)
}

async fn create_society(
    State(state): State<RegistryRouterState>,
    headers: HeaderMap,
    Json(draft): Json<SocietyDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::CREATED,
        state.service.create_society(&ctx, draft, Utc::now())?,
    )
}

async fn get_society(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state.service.get_society(&ctx, &SocietyId(society_id))?,
    )
}

async fn update_society(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<SocietyDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .update_society(&ctx, &SocietyId(society_id), draft)?,
    )
}

async fn delete_society(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state.service.delete_society(&ctx, &SocietyId(society_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_residents(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state.service.list_residents(&ctx, &SocietyId(society_id))?,
    )
}

async fn create_resident(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<ResidentDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::CREATED,
        state
            .service
            .create_resident(&ctx, &SocietyId(society_id), draft, Utc::now())?,
    )
}

async fn get_resident(
    State(state): State<RegistryRouterState>,
    Path(resident_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state.service.get_resident(&ctx, &ResidentId(resident_id))?,
    )
}

async fn update_resident(
    State(state): State<RegistryRouterState>,
    Path(resident_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<ResidentDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .update_resident(&ctx, &ResidentId(resident_id), draft)?,
    )
}

async fn delete_resident(
    State(state): State<RegistryRouterState>,
    Path(resident_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state
        .service
        .delete_resident(&ctx, &ResidentId(resident_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_vehicles(
    State(state): State<RegistryRouterState>,
    Path(resident_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state.service.list_vehicles(&ctx, &ResidentId(resident_id))?,
    )
}

async fn add_vehicle(
    State(state): State<RegistryRouterState>,
    Path(resident_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<VehicleDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::CREATED,
        state
            .service
            .add_vehicle(&ctx, &ResidentId(resident_id), draft, Utc::now())?,
    )
}

async fn update_vehicle(
    State(state): State<RegistryRouterState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<VehicleDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .update_vehicle(&ctx, &VehicleId(vehicle_id), draft)?,
    )
}

async fn set_primary_vehicle(
    State(state): State<RegistryRouterState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .set_primary_vehicle(&ctx, &VehicleId(vehicle_id))?,
    )
}

async fn delete_vehicle(
    State(state): State<RegistryRouterState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state.service.delete_vehicle(&ctx, &VehicleId(vehicle_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_bills(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    let society_id = SocietyId(society_id);
    let today = state.service.society_today(&society_id, Utc::now())?;
    ok(
        StatusCode::OK,
        state.service.list_bills(&ctx, &society_id, today)?,
    )
}

async fn create_bill(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<BillDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::CREATED,
        state
            .service
            .create_bill(&ctx, &SocietyId(society_id), draft, Utc::now())?,
    )
}

async fn bill_stats(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    let society_id = SocietyId(society_id);
    let today = state.service.society_today(&society_id, Utc::now())?;
    ok(
        StatusCode::OK,
        state.service.bill_stats(&ctx, &society_id, today)?,
    )
}

async fn pay_bill(
    State(state): State<RegistryRouterState>,
    Path(bill_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .mark_bill_paid(&ctx, &BillId(bill_id), Utc::now())?,
    )
}

async fn delete_bill(
    State(state): State<RegistryRouterState>,
    Path(bill_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state.service.delete_bill(&ctx, &BillId(bill_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_complaints(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .list_complaints(&ctx, &SocietyId(society_id))?,
    )
}

async fn file_complaint(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<ComplaintDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::CREATED,
        state
            .service
            .file_complaint(&ctx, &SocietyId(society_id), draft, Utc::now())?,
    )
}

async fn complaint_stats(
    State(state): State<RegistryRouterState>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state
            .service
            .complaint_stats(&ctx, &SocietyId(society_id))?,
    )
}

#[derive(Debug, Deserialize)]
struct ComplaintStatusChange {
    status: ComplaintStatus,
    #[serde(default)]
    note: Option<String>,
}

async fn update_complaint_status(
    State(state): State<RegistryRouterState>,
    Path(complaint_id): Path<String>,
    headers: HeaderMap,
    Json(change): Json<ComplaintStatusChange>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(
        StatusCode::OK,
        state.service.update_complaint_status(
            &ctx,
            &ComplaintId(complaint_id),
            change.status,
            change.note,
            Utc::now(),
        )?,
    )
}

async fn delete_complaint(
    State(state): State<RegistryRouterState>,
    Path(complaint_id): Path<String>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state
        .service
        .delete_complaint(&ctx, &ComplaintId(complaint_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
struct FaqQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Full list, or ranked matches when `q` is given. Open to anonymous callers.
async fn list_faqs(State(state): State<RegistryRouterState>, Query(query): Query<FaqQuery>) -> Handled {
    match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => ok(
            StatusCode::OK,
            state
                .service
                .faqs()
                .search(q, query.limit.unwrap_or(DEFAULT_FAQ_LIMIT))?,
        ),
        None => ok(StatusCode::OK, state.service.faqs().list()?),
    }
}

async fn add_faq(
    State(state): State<RegistryRouterState>,
    headers: HeaderMap,
    Json(draft): Json<FaqDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(StatusCode::CREATED, state.service.add_faq(&ctx, draft)?)
}

async fn update_faq(
    State(state): State<RegistryRouterState>,
    Path(faq_id): Path<u64>,
    headers: HeaderMap,
    Json(draft): Json<FaqDraft>,
) -> Handled {
    let ctx = state.context(&headers)?;
    ok(StatusCode::OK, state.service.update_faq(&ctx, faq_id, draft)?)
}

async fn remove_faq(
    State(state): State<RegistryRouterState>,
    Path(faq_id): Path<u64>,
    headers: HeaderMap,
) -> Handled {
    let ctx = state.context(&headers)?;
    state.service.remove_faq(&ctx, faq_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

impl RegistryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::NotFound(_) | RegistryError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::Conflict(_) | RegistryError::Repository(RepositoryError::Conflict) => {
                StatusCode::CONFLICT
            }
            RegistryError::Repository(RepositoryError::Unavailable(_))
            | RegistryError::Directory(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "registry request failed upstream");
        }
        let payload = json!({
            "error": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}
