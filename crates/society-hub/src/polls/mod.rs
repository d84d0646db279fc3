//! Poll and survey participation workflow.
//!
//! A poll collects one ballot per resident over a fixed window; a survey
//! collects typed answers to ordered questions under the same one-completion
//! rule. Persistence, result aggregation and the eligibility predicate sit
//! behind traits so the hosted backend can be swapped for in-memory adapters.

pub mod audience;
pub mod domain;
pub mod eligibility;
pub mod events;
pub mod memory;
pub mod repository;
pub mod results;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use audience::AudienceAuthorizer;
pub use domain::{
    OptionDraft, OptionId, OrderTieBreak, ParticipationRecord, Poll, PollAggregate, PollDraft,
    PollId, PollKind, PollOption, PollResponse, PollStatus, QuestionDraft, QuestionId,
    QuestionType, SurveyAnswer, SurveyAnswerValue, SurveyQuestion, SurveyResponse,
    TargetAudience,
};
pub use eligibility::{IneligibleReason, PollPhase, TransitionError};
pub use events::{ChangeFeed, ChangeKind, ChangeTable, PollChange, SubscriptionHandle};
pub use memory::{InMemoryPollStore, PollRowCounts};
pub use repository::{
    AuthorizerError, ParticipationAuthorizer, PollRepository, PollSummaryRow, RepositoryError,
    ResultAggregator, SocietyAccess,
};
pub use results::OptionResult;
pub use router::poll_router;
pub use service::{PollPolicy, PollService, PollServiceError, PollView};
pub use validation::ValidationError;
