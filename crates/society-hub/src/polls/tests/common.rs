use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::actors::{Actor, ActorContext, ActorDirectory, ActorRole, DirectoryError};
use crate::polls::domain::{
    OptionDraft, OptionId, ParticipationRecord, Poll, PollAggregate, PollDraft, PollId, PollKind,
    PollStatus, QuestionDraft, QuestionType, SubmissionOutcome, SubmissionRecord, TargetAudience,
};
use crate::polls::repository::{
    AuthorizerError, ParticipationAuthorizer, PollRepository, PollSummaryRow, RepositoryError,
    ResultAggregator, SocietyAccess,
};
use crate::polls::{poll_router, InMemoryPollStore, PollPolicy, PollService};
use crate::registry::{ResidentId, SocietyId};

pub(super) const ADMIN_TOKEN: &str = "admin-token";
pub(super) const U1_TOKEN: &str = "u1-token";
pub(super) const U2_TOKEN: &str = "u2-token";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn society() -> SocietyId {
    SocietyId("soc-greenfield".to_string())
}

pub(super) fn actor(id: &str, role: ActorRole) -> Actor {
    Actor {
        resident_id: ResidentId(id.to_string()),
        role,
    }
}

pub(super) fn resident(id: &str) -> ActorContext {
    ActorContext::authenticated(actor(id, ActorRole::Resident))
}

pub(super) fn admin() -> ActorContext {
    ActorContext::authenticated(actor("res-admin", ActorRole::Admin))
}

pub(super) fn yes_no_draft() -> PollDraft {
    PollDraft {
        title: "Repaint the east wing?".to_string(),
        description: "Quote attached in the notice board".to_string(),
        kind: PollKind::Poll,
        status: None,
        start_date: None,
        end_date: now() + Duration::days(7),
        target_audience: TargetAudience::All,
        is_anonymous: false,
        allow_multiple_responses: false,
        options: vec![
            OptionDraft {
                text: "Yes".to_string(),
                option_order: Some(0),
            },
            OptionDraft {
                text: "No".to_string(),
                option_order: Some(1),
            },
        ],
        questions: Vec::new(),
    }
}

pub(super) fn survey_draft() -> PollDraft {
    PollDraft {
        title: "Amenities feedback".to_string(),
        description: String::new(),
        kind: PollKind::Survey,
        status: None,
        start_date: None,
        end_date: now() + Duration::days(14),
        target_audience: TargetAudience::All,
        is_anonymous: false,
        allow_multiple_responses: false,
        options: Vec::new(),
        questions: vec![
            QuestionDraft {
                prompt: "How clean is the pool?".to_string(),
                question_type: QuestionType::Rating,
                options: Vec::new(),
                required: true,
                question_order: Some(0),
            },
            QuestionDraft {
                prompt: "Which amenity do you use most?".to_string(),
                question_type: QuestionType::SingleChoice,
                options: vec!["Gym".to_string(), "Pool".to_string()],
                required: true,
                question_order: Some(1),
            },
            QuestionDraft {
                prompt: "Anything else?".to_string(),
                question_type: QuestionType::Text,
                options: Vec::new(),
                required: false,
                question_order: Some(2),
            },
        ],
    }
}

pub(super) type MemoryService = PollService<InMemoryPollStore, StaticAuthorizer>;

pub(super) fn build_service() -> (MemoryService, InMemoryPollStore) {
    build_service_with(PollPolicy::default(), StaticAuthorizer::allow_all())
}

pub(super) fn build_service_with(
    policy: PollPolicy,
    authorizer: StaticAuthorizer,
) -> (MemoryService, InMemoryPollStore) {
    let store = InMemoryPollStore::default();
    let service = PollService::new(Arc::new(store.clone()), Arc::new(authorizer), policy);
    (service, store)
}

pub(super) fn create(service: &MemoryService, draft: PollDraft) -> PollAggregate {
    service
        .create_poll(&admin(), &society(), draft, now())
        .expect("poll created")
}

/// Authorizer with a fixed answer, optionally failing outright.
/// Society membership is answered separately and never goes offline.
pub(super) struct StaticAuthorizer {
    allowed: bool,
    offline: bool,
    membership: SocietyAccess,
}

impl StaticAuthorizer {
    pub(super) fn allow_all() -> Self {
        Self {
            allowed: true,
            offline: false,
            membership: SocietyAccess::Member,
        }
    }

    pub(super) fn deny_all() -> Self {
        Self {
            allowed: false,
            ..Self::allow_all()
        }
    }

    pub(super) fn offline() -> Self {
        Self {
            allowed: false,
            offline: true,
            ..Self::allow_all()
        }
    }

    pub(super) fn with_membership(self, membership: SocietyAccess) -> Self {
        Self { membership, ..self }
    }
}

impl ParticipationAuthorizer for StaticAuthorizer {
    fn can_participate(
        &self,
        _poll_id: &PollId,
        _resident_id: &ResidentId,
    ) -> Result<bool, AuthorizerError> {
        if self.offline {
            return Err(AuthorizerError::Unavailable("rpc timeout".to_string()));
        }
        Ok(self.allowed)
    }

    fn society_access(
        &self,
        _society_id: &SocietyId,
        _actor: &Actor,
    ) -> Result<SocietyAccess, AuthorizerError> {
        Ok(self.membership)
    }
}

pub(super) struct UnavailableRepository;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl PollRepository for UnavailableRepository {
    fn insert_poll(&self, _aggregate: PollAggregate) -> Result<PollAggregate, RepositoryError> {
        Err(offline())
    }

    fn fetch_poll(&self, _id: &PollId) -> Result<Option<PollAggregate>, RepositoryError> {
        Err(offline())
    }

    fn list_poll_summaries(
        &self,
        _society_id: &SocietyId,
        _actor: Option<&ResidentId>,
    ) -> Result<Vec<PollSummaryRow>, RepositoryError> {
        Err(offline())
    }

    fn poll_summary(
        &self,
        _id: &PollId,
        _actor: Option<&ResidentId>,
    ) -> Result<Option<PollSummaryRow>, RepositoryError> {
        Err(offline())
    }

    fn update_status(&self, _id: &PollId, _status: PollStatus) -> Result<Poll, RepositoryError> {
        Err(offline())
    }

    fn delete_poll(&self, _id: &PollId) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn participation(
        &self,
        _poll_id: &PollId,
        _resident_id: &ResidentId,
    ) -> Result<Option<ParticipationRecord>, RepositoryError> {
        Err(offline())
    }

    fn record_submission(
        &self,
        _submission: SubmissionRecord,
    ) -> Result<SubmissionOutcome, RepositoryError> {
        Err(offline())
    }
}

impl ResultAggregator for UnavailableRepository {
    fn vote_counts(&self, _poll_id: &PollId) -> Result<BTreeMap<OptionId, u64>, RepositoryError> {
        Err(offline())
    }
}

pub(super) struct TokenDirectory {
    actors: HashMap<String, Actor>,
}

impl Default for TokenDirectory {
    fn default() -> Self {
        let actors = HashMap::from([
            (
                ADMIN_TOKEN.to_string(),
                actor("res-admin", ActorRole::Admin),
            ),
            (U1_TOKEN.to_string(), actor("res-u1", ActorRole::Resident)),
            (U2_TOKEN.to_string(), actor("res-u2", ActorRole::Resident)),
        ]);
        Self { actors }
    }
}

impl ActorDirectory for TokenDirectory {
    fn resolve(&self, credential: &str) -> Result<Option<Actor>, DirectoryError> {
        Ok(self.actors.get(credential).cloned())
    }
}

pub(super) fn router_with_service<R, Z>(service: PollService<R, Z>) -> axum::Router
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    poll_router(Arc::new(service), Arc::new(TokenDirectory::default()))
}

pub(super) fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request")
}

pub(super) fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
