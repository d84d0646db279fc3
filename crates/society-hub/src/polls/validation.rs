use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::domain::{
    OptionId, Poll, PollAggregate, PollDraft, PollId, PollKind, PollOption, PollStatus,
    QuestionId, QuestionType, SurveyAnswer, SurveyAnswerValue, SurveyQuestion,
};
use crate::ids;
use crate::registry::{ResidentId, SocietyId};

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_TITLE_LEN: usize = 200;
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Payload and answer validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,
    #[error("title exceeds {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("end date {end} must be after start date {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("a new poll must start as draft or active, not {0}")]
    InvalidInitialStatus(PollStatus),
    #[error("a poll needs at least {MIN_POLL_OPTIONS} options")]
    TooFewOptions,
    #[error("option {0} is blank")]
    BlankOption(usize),
    #[error("option '{0}' is listed more than once")]
    DuplicateOption(String),
    #[error("a poll cannot carry survey questions")]
    UnexpectedQuestions,
    #[error("a survey cannot carry poll options")]
    UnexpectedOptions,
    #[error("a survey needs at least one question")]
    NoQuestions,
    #[error("question {0} is blank")]
    BlankQuestion(usize),
    #[error("choice question {0} needs at least {MIN_POLL_OPTIONS} distinct options")]
    ChoiceQuestionNeedsOptions(usize),
    #[error("question {0} does not take options")]
    QuestionOptionsNotAllowed(usize),
    #[error("select at least one option")]
    NoSelection,
    #[error("this poll accepts a single option")]
    TooManySelections,
    #[error("option {0} does not belong to this poll")]
    UnknownOption(OptionId),
    #[error("option {0} was selected more than once")]
    DuplicateSelection(OptionId),
    #[error("question {0} does not belong to this survey")]
    UnknownQuestion(QuestionId),
    #[error("question {0} was answered more than once")]
    DuplicateAnswer(QuestionId),
    #[error("question {0} is required")]
    MissingRequiredAnswer(QuestionId),
    #[error("question {0} needs a non-empty answer")]
    EmptyTextAnswer(QuestionId),
    #[error("question {0} needs a rating")]
    MissingRating(QuestionId),
    #[error("rating {value} for question {question} is outside 1..=5")]
    RatingOutOfRange { question: QuestionId, value: u8 },
    #[error("question {0} needs a selected option")]
    MissingChoice(QuestionId),
    #[error("question {0} accepts a single option")]
    SingleChoiceExpectsOne(QuestionId),
    #[error("'{choice}' is not an option of question {question}")]
    InvalidChoice { question: QuestionId, choice: String },
    #[error("'{choice}' was selected more than once for question {question}")]
    DuplicateChoice { question: QuestionId, choice: String },
    #[error("submission contains no answers")]
    EmptySubmission,
}

/// Validate a draft and build the aggregate to persist, children in order.
pub fn build_aggregate(
    draft: PollDraft,
    society_id: SocietyId,
    created_by: ResidentId,
    now: DateTime<Utc>,
) -> Result<PollAggregate, ValidationError> {
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }

    let start = draft.start_date.unwrap_or(now);
    if draft.end_date <= start {
        return Err(ValidationError::InvalidWindow {
            start,
            end: draft.end_date,
        });
    }

    let status = draft.status.unwrap_or(PollStatus::Active);
    if !matches!(status, PollStatus::Draft | PollStatus::Active) {
        return Err(ValidationError::InvalidInitialStatus(status));
    }

    let poll_id = PollId(ids::next_id("poll"));

    let (options, questions) = match draft.kind {
        PollKind::Poll => {
            if !draft.questions.is_empty() {
                return Err(ValidationError::UnexpectedQuestions);
            }
            if draft.options.len() < MIN_POLL_OPTIONS {
                return Err(ValidationError::TooFewOptions);
            }
            let mut seen = BTreeSet::new();
            let mut options = Vec::with_capacity(draft.options.len());
            for (index, option) in draft.options.into_iter().enumerate() {
                let text = option.text.trim().to_string();
                if text.is_empty() {
                    return Err(ValidationError::BlankOption(index));
                }
                if !seen.insert(text.to_lowercase()) {
                    return Err(ValidationError::DuplicateOption(text));
                }
                options.push(PollOption {
                    id: OptionId(ids::next_id("opt")),
                    poll_id: poll_id.clone(),
                    text,
                    option_order: option.option_order.unwrap_or(index as u32),
                    sequence: ids::next_sequence(),
                });
            }
            (options, Vec::new())
        }
        PollKind::Survey => {
            if !draft.options.is_empty() {
                return Err(ValidationError::UnexpectedOptions);
            }
            if draft.questions.is_empty() {
                return Err(ValidationError::NoQuestions);
            }
            let mut questions = Vec::with_capacity(draft.questions.len());
            for (index, question) in draft.questions.into_iter().enumerate() {
                let prompt = question.prompt.trim().to_string();
                if prompt.is_empty() {
                    return Err(ValidationError::BlankQuestion(index));
                }
                let options = normalize_question_options(index, question.question_type, question.options)?;
                questions.push(SurveyQuestion {
                    id: QuestionId(ids::next_id("q")),
                    poll_id: poll_id.clone(),
                    prompt,
                    question_type: question.question_type,
                    options,
                    required: question.required,
                    question_order: question.question_order.unwrap_or(index as u32),
                    sequence: ids::next_sequence(),
                });
            }
            (Vec::new(), questions)
        }
    };

    Ok(PollAggregate {
        poll: Poll {
            id: poll_id,
            society_id,
            title,
            description: draft.description.trim().to_string(),
            kind: draft.kind,
            status,
            start_date: start,
            end_date: draft.end_date,
            target_audience: draft.target_audience,
            is_anonymous: draft.is_anonymous,
            allow_multiple_responses: draft.allow_multiple_responses,
            created_by,
            created_at: now,
        },
        options,
        questions,
    })
}

fn normalize_question_options(
    index: usize,
    question_type: QuestionType,
    options: Vec<String>,
) -> Result<Vec<String>, ValidationError> {
    if !question_type.is_choice() {
        if options.iter().any(|option| !option.trim().is_empty()) {
            return Err(ValidationError::QuestionOptionsNotAllowed(index));
        }
        return Ok(Vec::new());
    }

    let mut seen = BTreeSet::new();
    let normalized: Vec<String> = options
        .into_iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty() && seen.insert(option.to_lowercase()))
        .collect();

    if normalized.len() < MIN_POLL_OPTIONS {
        return Err(ValidationError::ChoiceQuestionNeedsOptions(index));
    }
    Ok(normalized)
}

/// Check a ballot against the poll's options and multi-response flag.
pub fn validate_ballot(
    aggregate: &PollAggregate,
    option_ids: &[OptionId],
) -> Result<Vec<OptionId>, ValidationError> {
    if option_ids.is_empty() {
        return Err(ValidationError::NoSelection);
    }
    if option_ids.len() > 1 && !aggregate.poll.allow_multiple_responses {
        return Err(ValidationError::TooManySelections);
    }

    let mut seen = BTreeSet::new();
    for option_id in option_ids {
        if aggregate.option(option_id).is_none() {
            return Err(ValidationError::UnknownOption(option_id.clone()));
        }
        if !seen.insert(option_id) {
            return Err(ValidationError::DuplicateSelection(option_id.clone()));
        }
    }

    Ok(option_ids.to_vec())
}

/// Validate survey answers per question type and required flag.
///
/// Returns one normalized value per answered question, in question order.
/// Blank answers to optional questions are dropped.
pub fn validate_survey_answers(
    aggregate: &PollAggregate,
    answers: Vec<SurveyAnswer>,
) -> Result<Vec<(QuestionId, SurveyAnswerValue)>, ValidationError> {
    let mut by_question: BTreeMap<QuestionId, SurveyAnswer> = BTreeMap::new();
    for answer in answers {
        if aggregate.question(&answer.question_id).is_none() {
            return Err(ValidationError::UnknownQuestion(answer.question_id));
        }
        if by_question.contains_key(&answer.question_id) {
            return Err(ValidationError::DuplicateAnswer(answer.question_id));
        }
        by_question.insert(answer.question_id.clone(), answer);
    }

    let mut accepted = Vec::new();
    for question in &aggregate.questions {
        let Some(answer) = by_question.remove(&question.id) else {
            if question.required {
                return Err(ValidationError::MissingRequiredAnswer(question.id.clone()));
            }
            continue;
        };

        if let Some(value) = answer_value(question, answer)? {
            accepted.push((question.id.clone(), value));
        }
    }

    if accepted.is_empty() {
        return Err(ValidationError::EmptySubmission);
    }
    Ok(accepted)
}

fn answer_value(
    question: &SurveyQuestion,
    answer: SurveyAnswer,
) -> Result<Option<SurveyAnswerValue>, ValidationError> {
    let id = || question.id.clone();
    match question.question_type {
        QuestionType::Text => {
            let text = answer.text.as_deref().map(str::trim).unwrap_or_default();
            match (text.is_empty(), question.required) {
                (true, true) => Err(ValidationError::EmptyTextAnswer(id())),
                (true, false) => Ok(None),
                (false, _) => Ok(Some(SurveyAnswerValue::Text(text.to_string()))),
            }
        }
        QuestionType::Rating => match answer.rating {
            None if question.required => Err(ValidationError::MissingRating(id())),
            None => Ok(None),
            Some(value) if !RATING_RANGE.contains(&value) => {
                Err(ValidationError::RatingOutOfRange {
                    question: id(),
                    value,
                })
            }
            Some(value) => Ok(Some(SurveyAnswerValue::Rating(value))),
        },
        QuestionType::SingleChoice | QuestionType::MultipleChoice => {
            let selected: Vec<String> = answer
                .selected_options
                .iter()
                .map(|choice| choice.trim().to_string())
                .filter(|choice| !choice.is_empty())
                .collect();

            if selected.is_empty() {
                return if question.required {
                    Err(ValidationError::MissingChoice(id()))
                } else {
                    Ok(None)
                };
            }
            if question.question_type == QuestionType::SingleChoice && selected.len() > 1 {
                return Err(ValidationError::SingleChoiceExpectsOne(id()));
            }

            let mut seen = BTreeSet::new();
            for choice in &selected {
                if !question.options.iter().any(|option| option == choice) {
                    return Err(ValidationError::InvalidChoice {
                        question: id(),
                        choice: choice.clone(),
                    });
                }
                if !seen.insert(choice.as_str()) {
                    return Err(ValidationError::DuplicateChoice {
                        question: id(),
                        choice: choice.clone(),
                    });
                }
            }
            Ok(Some(SurveyAnswerValue::Choices(selected)))
        }
    }
}
