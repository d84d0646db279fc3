use std::collections::BTreeMap;

use super::domain::{
    OptionId, ParticipationRecord, Poll, PollAggregate, PollId, PollStatus, SubmissionOutcome,
    SubmissionRecord,
};
use crate::actors::Actor;
use crate::registry::{ResidentId, SocietyId};

/// One row of the aggregating list query: the poll with its children plus
/// participation and vote counts, so listing never issues per-poll lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummaryRow {
    pub aggregate: PollAggregate,
    pub completed_count: u64,
    pub actor_completed: bool,
    pub option_votes: BTreeMap<OptionId, u64>,
}

/// Durable store for polls, options, questions, responses and participation.
///
/// Deleting a poll removes every child row. `record_submission` is the only
/// write path for responses and must be atomic: the participation upsert keyed
/// by (poll, resident) decides whether the response rows are written at all.
pub trait PollRepository: Send + Sync {
    fn insert_poll(&self, aggregate: PollAggregate) -> Result<PollAggregate, RepositoryError>;
    fn fetch_poll(&self, id: &PollId) -> Result<Option<PollAggregate>, RepositoryError>;
    fn list_poll_summaries(
        &self,
        society_id: &SocietyId,
        actor: Option<&ResidentId>,
    ) -> Result<Vec<PollSummaryRow>, RepositoryError>;
    fn poll_summary(
        &self,
        id: &PollId,
        actor: Option<&ResidentId>,
    ) -> Result<Option<PollSummaryRow>, RepositoryError>;
    fn update_status(&self, id: &PollId, status: PollStatus) -> Result<Poll, RepositoryError>;
    fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError>;
    fn participation(
        &self,
        poll_id: &PollId,
        resident_id: &ResidentId,
    ) -> Result<Option<ParticipationRecord>, RepositoryError>;
    fn record_submission(
        &self,
        submission: SubmissionRecord,
    ) -> Result<SubmissionOutcome, RepositoryError>;
}

/// Externally computed vote tallies (a stored procedure in the hosted backend).
pub trait ResultAggregator: Send + Sync {
    fn vote_counts(&self, poll_id: &PollId) -> Result<BTreeMap<OptionId, u64>, RepositoryError>;
}

/// How an actor stands towards a society when publishing a poll there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocietyAccess {
    UnknownSociety,
    Outsider,
    Member,
}

/// Externally implemented eligibility predicates; the service trusts their answers.
pub trait ParticipationAuthorizer: Send + Sync {
    fn can_participate(
        &self,
        poll_id: &PollId,
        resident_id: &ResidentId,
    ) -> Result<bool, AuthorizerError>;

    /// Administrators are members of every society that exists.
    fn society_access(
        &self,
        society_id: &SocietyId,
        actor: &Actor,
    ) -> Result<SocietyAccess, AuthorizerError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizerError {
    #[error("authorization check unavailable: {0}")]
    Unavailable(String),
}
