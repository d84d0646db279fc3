use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{OptionId, PollDraft, PollId, PollStatus, SurveyAnswer};
use super::repository::{ParticipationAuthorizer, PollRepository, RepositoryError, ResultAggregator};
use super::service::{PollService, PollServiceError};
use crate::actors::{context_from_headers, ActorContext, ActorDirectory};
use crate::registry::SocietyId;

/// Shared handler state: the service plus the directory used to resolve callers.
pub struct PollRouterState<R, Z> {
    service: Arc<PollService<R, Z>>,
    directory: Arc<dyn ActorDirectory>,
}

impl<R, Z> Clone for PollRouterState<R, Z> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            directory: self.directory.clone(),
        }
    }
}

impl<R, Z> PollRouterState<R, Z> {
    fn context(&self, headers: &HeaderMap) -> Result<ActorContext, PollServiceError> {
        Ok(context_from_headers(self.directory.as_ref(), headers)?)
    }
}

/// Router exposing the poll and survey endpoints.
pub fn poll_router<R, Z>(
    service: Arc<PollService<R, Z>>,
    directory: Arc<dyn ActorDirectory>,
) -> Router
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    Router::new()
        .route(
            "/api/v1/societies/:society_id/polls",
            get(list_handler::<R, Z>).post(create_handler::<R, Z>),
        )
        .route(
            "/api/v1/polls/:poll_id",
            get(detail_handler::<R, Z>).delete(delete_handler::<R, Z>),
        )
        .route("/api/v1/polls/:poll_id/votes", post(vote_handler::<R, Z>))
        .route(
            "/api/v1/polls/:poll_id/survey-responses",
            post(survey_handler::<R, Z>),
        )
        .route(
            "/api/v1/polls/:poll_id/status",
            post(status_handler::<R, Z>).patch(status_handler::<R, Z>),
        )
        .route("/api/v1/polls/:poll_id/results", get(results_handler::<R, Z>))
        .with_state(PollRouterState { service, directory })
}

/// Ballot body; accepts either a single `option_id` or an `option_ids` list.
#[derive(Debug, Deserialize)]
pub struct BallotRequest {
    #[serde(default)]
    pub option_id: Option<OptionId>,
    #[serde(default)]
    pub option_ids: Vec<OptionId>,
}

impl BallotRequest {
    fn into_selection(self) -> Vec<OptionId> {
        let mut selection = self.option_ids;
        if let Some(option_id) = self.option_id {
            selection.insert(0, option_id);
        }
        selection
    }
}

#[derive(Debug, Deserialize)]
pub struct SurveySubmission {
    pub answers: Vec<SurveyAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: PollStatus,
}

pub(crate) async fn list_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let polls = state
        .service
        .list_polls(&ctx, &SocietyId(society_id), Utc::now())?;
    Ok((StatusCode::OK, Json(polls)).into_response())
}

pub(crate) async fn create_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(society_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<PollDraft>,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let created = state
        .service
        .create_poll(&ctx, &SocietyId(society_id), draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

pub(crate) async fn detail_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let view = state.service.get_poll(&ctx, &PollId(poll_id), Utc::now())?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn delete_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    state.service.delete_poll(&ctx, &PollId(poll_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn vote_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
    Json(ballot): Json<BallotRequest>,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let record = state.service.cast_ballot(
        &ctx,
        &PollId(poll_id),
        &ballot.into_selection(),
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(crate) async fn survey_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<SurveySubmission>,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let record =
        state
            .service
            .submit_survey(&ctx, &PollId(poll_id), submission.answers, Utc::now())?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(crate) async fn status_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
    Json(change): Json<StatusChange>,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let poll = state
        .service
        .update_status(&ctx, &PollId(poll_id), change.status)?;
    Ok((StatusCode::OK, Json(poll)).into_response())
}

pub(crate) async fn results_handler<R, Z>(
    State(state): State<PollRouterState<R, Z>>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PollServiceError>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    let ctx = state.context(&headers)?;
    let results = state.service.results(&ctx, &PollId(poll_id), Utc::now())?;
    Ok((StatusCode::OK, Json(results)).into_response())
}

impl PollServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PollServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PollServiceError::Forbidden(_)
            | PollServiceError::NotMember
            | PollServiceError::ResultsHidden(_) => StatusCode::FORBIDDEN,
            PollServiceError::Ineligible(_) => StatusCode::FORBIDDEN,
            PollServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PollServiceError::Transition(_) => StatusCode::CONFLICT,
            PollServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            PollServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            PollServiceError::Repository(RepositoryError::Unavailable(_))
            | PollServiceError::Authorization(_)
            | PollServiceError::Directory(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for PollServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "poll request failed upstream");
        }
        let payload = json!({
            "error": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}
