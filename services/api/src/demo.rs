use crate::infra::{parse_timestamp, Backend, HubPollService};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use serde::Serialize;
use society_hub::actors::{Actor, ActorContext, ActorRole};
use society_hub::config::PollConfig;
use society_hub::error::AppError;
use society_hub::polls::{
    ChangeTable, OptionDraft, OptionResult, PollDraft, PollKind, PollServiceError, QuestionDraft,
    QuestionType, SurveyAnswer, TargetAudience,
};
use society_hub::registry::{
    RegistryService, ResidentDraft, ResidentId, ResidentType, SocietyDraft, SocietyId,
    SocietySettings,
};
use std::collections::BTreeMap;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Society name used for the walkthrough.
    #[arg(long, default_value = "Greenfield Residency")]
    pub(crate) society: String,
    /// Clock for the walkthrough as RFC 3339 (defaults to now).
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) at: Option<DateTime<Utc>>,
    /// Print the outcome as JSON instead of text.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DemoReport {
    pub(crate) society_id: SocietyId,
    pub(crate) poll_title: String,
    pub(crate) results: Vec<OptionResult>,
    pub(crate) total_responses: u64,
    pub(crate) repeat_vote_rejection: Option<String>,
    pub(crate) tenant_rejection: Option<String>,
    pub(crate) survey_responses: u64,
    pub(crate) changes: BTreeMap<String, u64>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let now = args.at.unwrap_or_else(Utc::now);
    let report = walkthrough(&args.society, now)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        println!("{rendered}");
    } else {
        render(&report);
    }
    Ok(())
}

fn admin() -> ActorContext {
    ActorContext::authenticated(Actor {
        resident_id: ResidentId("res-committee".to_string()),
        role: ActorRole::Admin,
    })
}

fn resident_ctx(id: &ResidentId) -> ActorContext {
    ActorContext::authenticated(Actor {
        resident_id: id.clone(),
        role: ActorRole::Resident,
    })
}

fn register(
    registry: &RegistryService,
    society: &SocietyId,
    name: &str,
    unit: &str,
    resident_type: ResidentType,
    owner_id: Option<ResidentId>,
    now: DateTime<Utc>,
) -> Result<ResidentId, AppError> {
    let draft = ResidentDraft {
        id: None,
        name: name.to_string(),
        email: format!("{}@residents.example", name.to_lowercase().replace(' ', ".")),
        phone: None,
        unit_number: unit.to_string(),
        resident_type,
        owner_id,
        avatar_url: None,
        move_in_date: None,
    };
    Ok(registry.create_resident(&admin(), society, draft, now)?.id)
}

/// Seed a society, run one owners-only poll and one survey, and collect the outcome.
pub(crate) fn walkthrough(society_name: &str, now: DateTime<Utc>) -> Result<DemoReport, AppError> {
    let backend = Backend::in_memory(&PollConfig::default());
    let mut changes = backend.polls.feed().receiver();

    let society = backend.registry.create_society(
        &admin(),
        SocietyDraft {
            name: society_name.to_string(),
            address: "Demo Lane".to_string(),
            settings: SocietySettings::default(),
        },
        now,
    )?;
    let owner = register(
        &backend.registry,
        &society.id,
        "Asha Rao",
        "A-101",
        ResidentType::Owner,
        None,
        now,
    )?;
    let tenant = register(
        &backend.registry,
        &society.id,
        "Ben Okafor",
        "A-101",
        ResidentType::Tenant,
        Some(owner.clone()),
        now,
    )?;

    let poll = backend.polls.create_poll(
        &admin(),
        &society.id,
        PollDraft {
            title: "Repaint the clubhouse this quarter?".to_string(),
            description: "Owners decide on the maintenance fund spend.".to_string(),
            kind: PollKind::Poll,
            status: None,
            start_date: None,
            end_date: now + Duration::days(7),
            target_audience: TargetAudience::Owners,
            is_anonymous: false,
            allow_multiple_responses: false,
            options: ["Yes", "No"]
                .into_iter()
                .map(|text| OptionDraft {
                    text: text.to_string(),
                    option_order: None,
                })
                .collect(),
            questions: Vec::new(),
        },
        now,
    )?;
    let yes = &poll.options[0].id;

    backend
        .polls
        .vote(&resident_ctx(&owner), &poll.poll.id, yes, now)?;
    let repeat_vote_rejection = rejection(backend.polls.vote(
        &resident_ctx(&owner),
        &poll.poll.id,
        yes,
        now,
    ))?;
    let tenant_rejection = rejection(backend.polls.vote(
        &resident_ctx(&tenant),
        &poll.poll.id,
        yes,
        now,
    ))?;

    let survey_responses = run_survey(&backend.polls, &society.id, &tenant, now)?;

    let view = backend
        .polls
        .get_poll(&resident_ctx(&owner), &poll.poll.id, now)?;
    let results = backend.polls.results(&admin(), &poll.poll.id, now)?;

    let mut counts = BTreeMap::new();
    while let Ok(change) = changes.try_recv() {
        *counts.entry(table_label(change.table).to_string()).or_insert(0) += 1;
    }

    Ok(DemoReport {
        society_id: society.id,
        poll_title: poll.poll.title,
        results,
        total_responses: view.total_responses,
        repeat_vote_rejection,
        tenant_rejection,
        survey_responses,
        changes: counts,
    })
}

fn run_survey(
    polls: &HubPollService,
    society: &SocietyId,
    respondent: &ResidentId,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let survey = polls.create_poll(
        &admin(),
        society,
        PollDraft {
            title: "Amenity feedback".to_string(),
            description: String::new(),
            kind: PollKind::Survey,
            status: None,
            start_date: None,
            end_date: now + Duration::days(14),
            target_audience: TargetAudience::All,
            is_anonymous: true,
            allow_multiple_responses: false,
            options: Vec::new(),
            questions: vec![
                QuestionDraft {
                    prompt: "How satisfied are you with the gym?".to_string(),
                    question_type: QuestionType::Rating,
                    options: Vec::new(),
                    required: true,
                    question_order: None,
                },
                QuestionDraft {
                    prompt: "Anything we should add?".to_string(),
                    question_type: QuestionType::Text,
                    options: Vec::new(),
                    required: false,
                    question_order: None,
                },
            ],
        },
        now,
    )?;

    polls.submit_survey(
        &resident_ctx(respondent),
        &survey.poll.id,
        vec![
            SurveyAnswer {
                question_id: survey.questions[0].id.clone(),
                rating: Some(4),
                ..SurveyAnswer::default()
            },
            SurveyAnswer {
                question_id: survey.questions[1].id.clone(),
                text: Some("Longer pool hours on weekends".to_string()),
                ..SurveyAnswer::default()
            },
        ],
        now,
    )?;
    Ok(polls
        .get_poll(&resident_ctx(respondent), &survey.poll.id, now)?
        .total_responses)
}

/// Expected rejections become messages; anything else aborts the demo.
fn rejection<T>(outcome: Result<T, PollServiceError>) -> Result<Option<String>, AppError> {
    match outcome {
        Ok(_) => Ok(None),
        Err(err @ PollServiceError::Ineligible(_)) => Ok(Some(err.to_string())),
        Err(err) => Err(err.into()),
    }
}

fn table_label(table: ChangeTable) -> &'static str {
    match table {
        ChangeTable::Polls => "polls",
        ChangeTable::PollOptions => "poll_options",
        ChangeTable::SurveyQuestions => "survey_questions",
        ChangeTable::PollResponses => "poll_responses",
        ChangeTable::SurveyResponses => "survey_responses",
        ChangeTable::Participants => "participants",
    }
}

fn render(report: &DemoReport) {
    println!("Society hub demo ({})", report.society_id);
    println!("\nPoll: {}", report.poll_title);
    for result in &report.results {
        println!(
            "  - {:<6} {:>3} vote(s) {:>6.2}%",
            result.option_text, result.vote_count, result.percentage
        );
    }
    println!("  total responses: {}", report.total_responses);
    if let Some(message) = &report.repeat_vote_rejection {
        println!("  repeat vote rejected: {message}");
    }
    if let Some(message) = &report.tenant_rejection {
        println!("  tenant vote rejected: {message}");
    }

    println!("\nSurvey responses recorded: {}", report.survey_responses);

    if !report.changes.is_empty() {
        println!("\nChange notifications");
        for (table, count) in &report.changes {
            println!("  - {table}: {count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn walkthrough_matches_the_one_vote_rule() {
        let now = Utc
            .with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        let report = walkthrough("Test Towers", now).expect("demo runs");

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].vote_count, 1);
        assert_eq!(report.results[0].percentage, 100.0);
        assert_eq!(report.results[1].percentage, 0.0);
        assert_eq!(report.total_responses, 1);
        assert_eq!(
            report.repeat_vote_rejection.as_deref(),
            Some("you have already participated in this poll")
        );
        assert_eq!(
            report.tenant_rejection.as_deref(),
            Some("you are not eligible to participate in this poll")
        );
        assert_eq!(report.survey_responses, 1);
        assert_eq!(report.changes.get("participants"), Some(&2));
    }

    #[test]
    fn timestamps_flag_accepts_offsets() {
        assert!(parse_timestamp("2026-05-01T09:00:00Z").is_ok());
    }
}
