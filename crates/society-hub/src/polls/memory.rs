use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    OptionId, ParticipationRecord, Poll, PollAggregate, PollId, PollResponse, PollStatus,
    SubmissionOutcome, SubmissionRecord, SubmissionRows, SurveyResponse,
};
use super::repository::{PollRepository, PollSummaryRow, RepositoryError, ResultAggregator};
use crate::registry::{ResidentId, SocietyId};

#[derive(Default)]
struct PollTables {
    polls: BTreeMap<PollId, PollAggregate>,
    participants: HashMap<(PollId, ResidentId), ParticipationRecord>,
    poll_responses: Vec<PollResponse>,
    survey_responses: Vec<SurveyResponse>,
}

impl PollTables {
    fn vote_counts(&self, poll_id: &PollId) -> BTreeMap<OptionId, u64> {
        let mut counts = BTreeMap::new();
        for response in self.poll_responses.iter().filter(|r| &r.poll_id == poll_id) {
            *counts.entry(response.option_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn summary(&self, aggregate: &PollAggregate, actor: Option<&ResidentId>) -> PollSummaryRow {
        let poll_id = &aggregate.poll.id;
        let actor_completed = actor
            .and_then(|resident| self.participants.get(&(poll_id.clone(), resident.clone())))
            .is_some_and(|record| record.completed);
        PollSummaryRow {
            aggregate: aggregate.clone(),
            completed_count: self.completed_count(poll_id),
            actor_completed,
            option_votes: self.vote_counts(poll_id),
        }
    }

    fn completed_count(&self, poll_id: &PollId) -> u64 {
        self.participants
            .values()
            .filter(|record| &record.poll_id == poll_id && record.completed)
            .count() as u64
    }
}

/// Row counts still attached to a poll id, for cascade checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollRowCounts {
    pub options: usize,
    pub questions: usize,
    pub poll_responses: usize,
    pub survey_responses: usize,
    pub participants: usize,
}

/// Process-local poll store. A single mutex plays the role of the
/// transaction and of the (poll, resident) unique constraint.
#[derive(Default, Clone)]
pub struct InMemoryPollStore {
    tables: Arc<Mutex<PollTables>>,
}

impl InMemoryPollStore {
    fn lock(&self) -> Result<MutexGuard<'_, PollTables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("poll store mutex poisoned".to_string()))
    }

    pub fn poll_responses(&self, poll_id: &PollId) -> Result<Vec<PollResponse>, RepositoryError> {
        Ok(self
            .lock()?
            .poll_responses
            .iter()
            .filter(|response| &response.poll_id == poll_id)
            .cloned()
            .collect())
    }

    pub fn survey_responses(
        &self,
        poll_id: &PollId,
    ) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Ok(self
            .lock()?
            .survey_responses
            .iter()
            .filter(|response| &response.poll_id == poll_id)
            .cloned()
            .collect())
    }

    pub fn row_counts(&self, poll_id: &PollId) -> Result<PollRowCounts, RepositoryError> {
        let tables = self.lock()?;
        let (options, questions) = tables
            .polls
            .get(poll_id)
            .map(|aggregate| (aggregate.options.len(), aggregate.questions.len()))
            .unwrap_or((0, 0));
        Ok(PollRowCounts {
            options,
            questions,
            poll_responses: tables
                .poll_responses
                .iter()
                .filter(|response| &response.poll_id == poll_id)
                .count(),
            survey_responses: tables
                .survey_responses
                .iter()
                .filter(|response| &response.poll_id == poll_id)
                .count(),
            participants: tables
                .participants
                .keys()
                .filter(|(id, _)| id == poll_id)
                .count(),
        })
    }
}

impl PollRepository for InMemoryPollStore {
    fn insert_poll(&self, aggregate: PollAggregate) -> Result<PollAggregate, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.polls.contains_key(&aggregate.poll.id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .polls
            .insert(aggregate.poll.id.clone(), aggregate.clone());
        Ok(aggregate)
    }

    fn fetch_poll(&self, id: &PollId) -> Result<Option<PollAggregate>, RepositoryError> {
        Ok(self.lock()?.polls.get(id).cloned())
    }

    fn list_poll_summaries(
        &self,
        society_id: &SocietyId,
        actor: Option<&ResidentId>,
    ) -> Result<Vec<PollSummaryRow>, RepositoryError> {
        let tables = self.lock()?;
        let mut rows: Vec<PollSummaryRow> = tables
            .polls
            .values()
            .filter(|aggregate| &aggregate.poll.society_id == society_id)
            .map(|aggregate| tables.summary(aggregate, actor))
            .collect();

        rows.sort_by(|a, b| {
            b.aggregate
                .poll
                .created_at
                .cmp(&a.aggregate.poll.created_at)
                .then_with(|| a.aggregate.poll.id.cmp(&b.aggregate.poll.id))
        });
        Ok(rows)
    }

    fn poll_summary(
        &self,
        id: &PollId,
        actor: Option<&ResidentId>,
    ) -> Result<Option<PollSummaryRow>, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables
            .polls
            .get(id)
            .map(|aggregate| tables.summary(aggregate, actor)))
    }

    fn update_status(&self, id: &PollId, status: PollStatus) -> Result<Poll, RepositoryError> {
        let mut tables = self.lock()?;
        let aggregate = tables.polls.get_mut(id).ok_or(RepositoryError::NotFound)?;
        aggregate.poll.status = status;
        Ok(aggregate.poll.clone())
    }

    fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if tables.polls.remove(id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        tables.participants.retain(|(poll_id, _), _| poll_id != id);
        tables.poll_responses.retain(|response| &response.poll_id != id);
        tables.survey_responses.retain(|response| &response.poll_id != id);
        Ok(())
    }

    fn participation(
        &self,
        poll_id: &PollId,
        resident_id: &ResidentId,
    ) -> Result<Option<ParticipationRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .participants
            .get(&(poll_id.clone(), resident_id.clone()))
            .cloned())
    }

    fn record_submission(
        &self,
        submission: SubmissionRecord,
    ) -> Result<SubmissionOutcome, RepositoryError> {
        let mut tables = self.lock()?;
        if !tables.polls.contains_key(&submission.poll_id) {
            return Err(RepositoryError::NotFound);
        }

        let key = (submission.poll_id.clone(), submission.resident_id.clone());
        if tables
            .participants
            .get(&key)
            .is_some_and(|record| record.completed)
        {
            return Ok(SubmissionOutcome::AlreadyCompleted);
        }

        let record = ParticipationRecord {
            poll_id: submission.poll_id,
            resident_id: submission.resident_id,
            completed: true,
            completed_at: Some(submission.completed_at),
        };
        tables.participants.insert(key, record.clone());

        match submission.rows {
            SubmissionRows::Votes(rows) => tables.poll_responses.extend(rows),
            SubmissionRows::Survey(rows) => tables.survey_responses.extend(rows),
        }

        Ok(SubmissionOutcome::Recorded(record))
    }
}

impl ResultAggregator for InMemoryPollStore {
    fn vote_counts(&self, poll_id: &PollId) -> Result<BTreeMap<OptionId, u64>, RepositoryError> {
        let tables = self.lock()?;
        if !tables.polls.contains_key(poll_id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(tables.vote_counts(poll_id))
    }
}
