use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    OptionId, OrderTieBreak, ParticipationRecord, Poll, PollAggregate, PollDraft, PollId,
    PollKind, PollOption, PollResponse, PollStatus, SubmissionOutcome, SubmissionRecord,
    SubmissionRows, SurveyAnswer, SurveyQuestion, SurveyResponse,
};
use super::eligibility::{check_transition, ensure_voteable, IneligibleReason, PollPhase, TransitionError};
use super::events::{ChangeFeed, ChangeKind, ChangeTable, PollChange, SubscriptionHandle};
use super::repository::{
    AuthorizerError, ParticipationAuthorizer, PollRepository, PollSummaryRow, RepositoryError,
    ResultAggregator, SocietyAccess,
};
use super::results::{tally, OptionResult};
use super::validation::{build_aggregate, validate_ballot, validate_survey_answers, ValidationError};
use crate::actors::{Actor, ActorContext, DirectoryError};
use crate::ids;
use crate::registry::SocietyId;

/// Deployment choices for questions the workflow leaves open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollPolicy {
    pub tie_break: OrderTieBreak,
    pub archived_visible_to_residents: bool,
}

/// Poll as shown to one actor: ordered children, participation and, where
/// the phase allows, per-option results.
#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: Poll,
    pub phase: PollPhase,
    pub options: Vec<PollOption>,
    pub questions: Vec<SurveyQuestion>,
    pub total_responses: u64,
    pub user_has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<OptionResult>>,
}

/// Service composing the poll store, result aggregation and eligibility check.
pub struct PollService<R, Z> {
    repository: Arc<R>,
    authorizer: Arc<Z>,
    feed: ChangeFeed,
    policy: PollPolicy,
}

impl<R, Z> PollService<R, Z>
where
    R: PollRepository + ResultAggregator + 'static,
    Z: ParticipationAuthorizer + 'static,
{
    pub fn new(repository: Arc<R>, authorizer: Arc<Z>, policy: PollPolicy) -> Self {
        Self::with_feed(repository, authorizer, policy, ChangeFeed::default())
    }

    pub fn with_feed(
        repository: Arc<R>,
        authorizer: Arc<Z>,
        policy: PollPolicy,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            repository,
            authorizer,
            feed,
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Polls of a society, newest first, enriched for the calling actor.
    pub fn list_polls(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollView>, PollServiceError> {
        let actor = ctx.actor();
        let rows = self
            .repository
            .list_poll_summaries(society_id, actor.map(|actor| &actor.resident_id))?;

        Ok(rows
            .into_iter()
            .filter(|row| self.visible_to(actor, &row.aggregate.poll))
            .map(|row| self.view(row, now))
            .collect())
    }

    pub fn get_poll(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        now: DateTime<Utc>,
    ) -> Result<PollView, PollServiceError> {
        let actor = ctx.actor();
        let row = self
            .repository
            .poll_summary(poll_id, actor.map(|actor| &actor.resident_id))?
            .filter(|row| self.visible_to(actor, &row.aggregate.poll))
            .ok_or(RepositoryError::NotFound)?;
        Ok(self.view(row, now))
    }

    /// Persist a poll or survey with its ordered children in one write.
    pub fn create_poll(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        draft: PollDraft,
        now: DateTime<Utc>,
    ) -> Result<PollAggregate, PollServiceError> {
        let actor = require_actor(ctx)?;
        match self.authorizer.society_access(society_id, actor)? {
            SocietyAccess::Member => {}
            SocietyAccess::UnknownSociety => return Err(RepositoryError::NotFound.into()),
            SocietyAccess::Outsider => {
                warn!(society = %society_id.0, resident = %actor.resident_id.0, "poll creation outside own society");
                return Err(PollServiceError::NotMember);
            }
        }
        let mut aggregate =
            build_aggregate(draft, society_id.clone(), actor.resident_id.clone(), now)?;
        aggregate.sort_children(self.policy.tie_break);

        let stored = self.repository.insert_poll(aggregate)?;
        let poll = &stored.poll;
        info!(
            poll = %poll.id,
            society = %poll.society_id.0,
            kind = poll.kind.label(),
            children = stored.options.len() + stored.questions.len(),
            "poll created"
        );

        self.publish(poll, ChangeTable::Polls, ChangeKind::Insert);
        let child_table = match poll.kind {
            PollKind::Poll => ChangeTable::PollOptions,
            PollKind::Survey => ChangeTable::SurveyQuestions,
        };
        self.publish(poll, child_table, ChangeKind::Insert);

        Ok(stored)
    }

    /// Cast a single-option vote.
    pub fn vote(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        option_id: &OptionId,
        now: DateTime<Utc>,
    ) -> Result<ParticipationRecord, PollServiceError> {
        self.cast_ballot(ctx, poll_id, std::slice::from_ref(option_id), now)
    }

    /// Cast a vote for one or, on multi-response polls, several options.
    pub fn cast_ballot(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        option_ids: &[OptionId],
        now: DateTime<Utc>,
    ) -> Result<ParticipationRecord, PollServiceError> {
        let actor = require_actor(ctx)?;
        let aggregate = self.eligible_aggregate(actor, poll_id, PollKind::Poll, now)?;
        let selected = validate_ballot(&aggregate, option_ids)?;

        let resident = respondent(&aggregate.poll, actor);
        let rows = selected
            .into_iter()
            .map(|option_id| PollResponse {
                id: ids::next_id("resp"),
                poll_id: poll_id.clone(),
                option_id,
                resident_id: resident.clone(),
                created_at: now,
            })
            .collect();

        self.submit(actor, &aggregate.poll, SubmissionRows::Votes(rows), now)
    }

    /// Submit a full set of survey answers.
    pub fn submit_survey(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        answers: Vec<SurveyAnswer>,
        now: DateTime<Utc>,
    ) -> Result<ParticipationRecord, PollServiceError> {
        let actor = require_actor(ctx)?;
        let mut aggregate = self.eligible_aggregate(actor, poll_id, PollKind::Survey, now)?;
        aggregate.sort_children(self.policy.tie_break);
        let accepted = validate_survey_answers(&aggregate, answers)?;

        let resident = respondent(&aggregate.poll, actor);
        let rows = accepted
            .into_iter()
            .map(|(question_id, answer)| SurveyResponse {
                id: ids::next_id("sresp"),
                poll_id: poll_id.clone(),
                question_id,
                resident_id: resident.clone(),
                answer,
                created_at: now,
            })
            .collect();

        self.submit(actor, &aggregate.poll, SubmissionRows::Survey(rows), now)
    }

    /// Per-option results for a poll, from the external aggregation.
    /// Withheld until the poll has opened, as in the listing.
    pub fn results(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        now: DateTime<Utc>,
    ) -> Result<Vec<OptionResult>, PollServiceError> {
        let mut aggregate = self
            .repository
            .fetch_poll(poll_id)?
            .filter(|aggregate| self.visible_to(ctx.actor(), &aggregate.poll))
            .ok_or(RepositoryError::NotFound)?;
        if aggregate.poll.kind != PollKind::Poll {
            return Err(IneligibleReason::WrongKind(PollKind::Poll).into());
        }
        let phase = PollPhase::of(&aggregate.poll, now);
        if !phase.shows_results() {
            return Err(PollServiceError::ResultsHidden(phase));
        }
        aggregate.sort_children(self.policy.tie_break);

        let counts = self.repository.vote_counts(poll_id)?;
        Ok(tally(&aggregate.options, &counts))
    }

    pub fn update_status(
        &self,
        ctx: &ActorContext,
        poll_id: &PollId,
        status: PollStatus,
    ) -> Result<Poll, PollServiceError> {
        require_admin(ctx, "change poll status")?;
        let current = self
            .repository
            .fetch_poll(poll_id)?
            .ok_or(RepositoryError::NotFound)?
            .poll;

        if !check_transition(current.status, status)? {
            return Ok(current);
        }

        let updated = self.repository.update_status(poll_id, status)?;
        info!(poll = %poll_id, from = current.status.label(), to = status.label(), "poll status changed");
        self.publish(&updated, ChangeTable::Polls, ChangeKind::Update);
        Ok(updated)
    }

    /// Remove a poll; the store cascades children, responses and participation.
    pub fn delete_poll(&self, ctx: &ActorContext, poll_id: &PollId) -> Result<(), PollServiceError> {
        require_admin(ctx, "delete polls")?;
        let poll = self
            .repository
            .fetch_poll(poll_id)?
            .ok_or(RepositoryError::NotFound)?
            .poll;

        self.repository.delete_poll(poll_id)?;
        info!(poll = %poll_id, society = %poll.society_id.0, "poll deleted");
        self.publish(&poll, ChangeTable::Polls, ChangeKind::Delete);
        Ok(())
    }

    /// Live change notifications for a society's polls and responses.
    pub fn subscribe<F, Fut>(&self, society_id: SocietyId, callback: F) -> SubscriptionHandle
    where
        F: FnMut(PollChange) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.feed.subscribe(society_id, callback)
    }

    fn eligible_aggregate(
        &self,
        actor: &Actor,
        poll_id: &PollId,
        kind: PollKind,
        now: DateTime<Utc>,
    ) -> Result<PollAggregate, PollServiceError> {
        let aggregate = self
            .repository
            .fetch_poll(poll_id)?
            .ok_or(RepositoryError::NotFound)?;
        let poll = &aggregate.poll;

        if poll.kind != kind {
            return Err(IneligibleReason::WrongKind(kind).into());
        }
        ensure_voteable(poll, now)?;

        if !self
            .authorizer
            .can_participate(poll_id, &actor.resident_id)?
        {
            return Err(IneligibleReason::NotPermitted.into());
        }

        // Early rejection only; record_submission is the authoritative gate.
        if self
            .repository
            .participation(poll_id, &actor.resident_id)?
            .is_some_and(|record| record.completed)
        {
            return Err(IneligibleReason::AlreadyCompleted.into());
        }

        Ok(aggregate)
    }

    fn submit(
        &self,
        actor: &Actor,
        poll: &Poll,
        rows: SubmissionRows,
        now: DateTime<Utc>,
    ) -> Result<ParticipationRecord, PollServiceError> {
        let row_count = rows.len();
        let response_table = match rows {
            SubmissionRows::Votes(_) => ChangeTable::PollResponses,
            SubmissionRows::Survey(_) => ChangeTable::SurveyResponses,
        };

        let outcome = self.repository.record_submission(SubmissionRecord {
            poll_id: poll.id.clone(),
            resident_id: actor.resident_id.clone(),
            completed_at: now,
            rows,
        })?;

        match outcome {
            SubmissionOutcome::Recorded(record) => {
                info!(poll = %poll.id, kind = poll.kind.label(), rows = row_count, "participation recorded");
                self.publish(poll, response_table, ChangeKind::Insert);
                self.publish(poll, ChangeTable::Participants, ChangeKind::Insert);
                Ok(record)
            }
            SubmissionOutcome::AlreadyCompleted => {
                warn!(poll = %poll.id, resident = %actor.resident_id.0, "concurrent duplicate submission rejected");
                Err(IneligibleReason::AlreadyCompleted.into())
            }
        }
    }

    fn visible_to(&self, actor: Option<&Actor>, poll: &Poll) -> bool {
        poll.status != PollStatus::Archived
            || self.policy.archived_visible_to_residents
            || actor.is_some_and(Actor::is_admin)
    }

    fn view(&self, row: PollSummaryRow, now: DateTime<Utc>) -> PollView {
        let PollSummaryRow {
            mut aggregate,
            completed_count,
            actor_completed,
            option_votes,
        } = row;
        aggregate.sort_children(self.policy.tie_break);

        let phase = PollPhase::of(&aggregate.poll, now);
        let results = (aggregate.poll.kind == PollKind::Poll && phase.shows_results())
            .then(|| tally(&aggregate.options, &option_votes));

        PollView {
            poll: aggregate.poll,
            phase,
            options: aggregate.options,
            questions: aggregate.questions,
            total_responses: completed_count,
            user_has_voted: actor_completed,
            results,
        }
    }

    fn publish(&self, poll: &Poll, table: ChangeTable, kind: ChangeKind) {
        self.feed.publish(PollChange {
            society_id: poll.society_id.clone(),
            poll_id: poll.id.clone(),
            table,
            kind,
        });
    }
}

fn require_actor(ctx: &ActorContext) -> Result<&Actor, PollServiceError> {
    ctx.actor().ok_or(PollServiceError::Unauthenticated)
}

fn require_admin<'a>(
    ctx: &'a ActorContext,
    action: &'static str,
) -> Result<&'a Actor, PollServiceError> {
    let actor = require_actor(ctx)?;
    if actor.is_admin() {
        Ok(actor)
    } else {
        Err(PollServiceError::Forbidden(action))
    }
}

/// Response rows keep the resident only on non-anonymous polls.
fn respondent(poll: &Poll, actor: &Actor) -> Option<crate::registry::ResidentId> {
    (!poll.is_anonymous).then(|| actor.resident_id.clone())
}

/// Error raised by the poll service.
#[derive(Debug, thiserror::Error)]
pub enum PollServiceError {
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("only society administrators can {0}")]
    Forbidden(&'static str),
    #[error("you are not a member of this society")]
    NotMember,
    #[error("results are not available while the poll is {0}")]
    ResultsHidden(PollPhase),
    #[error(transparent)]
    Ineligible(#[from] IneligibleReason),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Authorization(#[from] AuthorizerError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
