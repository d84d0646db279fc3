use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{ResidentId, SocietyId};

/// Identifier wrapper for polls and surveys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PollId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OptionId(pub String);

#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct QuestionId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(PollId, OptionId, QuestionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Poll,
    Survey,
}

impl PollKind {
    pub const fn label(self) -> &'static str {
        match self {
            PollKind::Poll => "poll",
            PollKind::Survey => "survey",
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stored lifecycle status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Draft,
    Active,
    Closed,
    Archived,
}

impl PollStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PollStatus::Draft => "draft",
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
            PollStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub(crate) const fn rank(self) -> u8 {
        match self {
            PollStatus::Draft => 0,
            PollStatus::Active => 1,
            PollStatus::Closed => 2,
            PollStatus::Archived => 3,
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which residents a poll is meant for; enforced by the participation authorizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    #[default]
    All,
    Owners,
    Tenants,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub society_id: SocietyId,
    pub title: String,
    pub description: String,
    pub kind: PollKind,
    pub status: PollStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub target_audience: TargetAudience,
    pub is_anonymous: bool,
    pub allow_multiple_responses: bool,
    pub created_by: ResidentId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub poll_id: PollId,
    pub text: String,
    pub option_order: u32,
    /// Insertion sequence, used as the stable secondary sort key.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    Text,
    Rating,
}

impl QuestionType {
    pub const fn is_choice(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleChoice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub id: QuestionId,
    pub poll_id: PollId,
    pub prompt: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub required: bool,
    pub question_order: u32,
    pub sequence: u64,
}

/// A poll with its ordered children, as persisted in one write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAggregate {
    pub poll: Poll,
    pub options: Vec<PollOption>,
    pub questions: Vec<SurveyQuestion>,
}

impl PollAggregate {
    pub fn option(&self, id: &OptionId) -> Option<&PollOption> {
        self.options.iter().find(|option| &option.id == id)
    }

    pub fn question(&self, id: &QuestionId) -> Option<&SurveyQuestion> {
        self.questions.iter().find(|question| &question.id == id)
    }

    /// Sort children by their explicit order, breaking ties per `tie_break`.
    pub fn sort_children(&mut self, tie_break: OrderTieBreak) {
        self.options.sort_by(|a, b| {
            a.option_order
                .cmp(&b.option_order)
                .then_with(|| tie_break.compare(a.sequence, &a.text, b.sequence, &b.text))
        });
        self.questions.sort_by(|a, b| {
            a.question_order
                .cmp(&b.question_order)
                .then_with(|| tie_break.compare(a.sequence, &a.prompt, b.sequence, &b.prompt))
        });
    }
}

/// Secondary ordering for options/questions sharing the same order value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTieBreak {
    #[default]
    Insertion,
    Label,
}

impl OrderTieBreak {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insertion" => Some(Self::Insertion),
            "label" => Some(Self::Label),
            _ => None,
        }
    }

    fn compare(self, a_seq: u64, a_label: &str, b_seq: u64, b_label: &str) -> Ordering {
        match self {
            OrderTieBreak::Insertion => a_seq.cmp(&b_seq),
            OrderTieBreak::Label => a_label.cmp(b_label).then(a_seq.cmp(&b_seq)),
        }
    }
}

/// The sole guard against double voting; one row per (poll, resident).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub poll_id: PollId,
    pub resident_id: ResidentId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row per selected option. `resident_id` is withheld on anonymous polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub id: String,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub resident_id: Option<ResidentId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SurveyAnswerValue {
    Text(String),
    Rating(u8),
    Choices(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: String,
    pub poll_id: PollId,
    pub question_id: QuestionId,
    pub resident_id: Option<ResidentId>,
    pub answer: SurveyAnswerValue,
    pub created_at: DateTime<Utc>,
}

/// Inbound payload for creating a poll or survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: PollKind,
    #[serde(default)]
    pub status: Option<PollStatus>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub target_audience: TargetAudience,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub allow_multiple_responses: bool,
    #[serde(default)]
    pub options: Vec<OptionDraft>,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDraft {
    pub text: String,
    #[serde(default)]
    pub option_order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub prompt: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub question_order: Option<u32>,
}

/// Raw survey form answer; which field matters depends on the question type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub question_id: QuestionId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub selected_options: Vec<String>,
}

/// Rows to insert once participation is marked complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRows {
    Votes(Vec<PollResponse>),
    Survey(Vec<SurveyResponse>),
}

impl SubmissionRows {
    pub fn len(&self) -> usize {
        match self {
            SubmissionRows::Votes(rows) => rows.len(),
            SubmissionRows::Survey(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single write intent: complete participation and insert the response rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub poll_id: PollId,
    pub resident_id: ResidentId,
    pub completed_at: DateTime<Utc>,
    pub rows: SubmissionRows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Recorded(ParticipationRecord),
    AlreadyCompleted,
}
