//! Knowledge base behind the resident help chatbot. Entries live only in
//! process memory.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{require_admin, required_text, RegistryError, RegistryService};
use crate::actors::ActorContext;
use crate::polls::RepositoryError;

const KEYWORD_WEIGHT: u32 = 3;
const QUESTION_WEIGHT: u32 = 2;
const ANSWER_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqDraft {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaqMatch {
    pub entry: FaqEntry,
    pub score: u32,
}

#[derive(Default)]
struct FaqShelf {
    next_id: u64,
    entries: Vec<FaqEntry>,
}

/// Shared, mutable FAQ list with keyword search.
#[derive(Default, Clone)]
pub struct FaqBook {
    shelf: Arc<Mutex<FaqShelf>>,
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn entry_from(id: u64, draft: FaqDraft) -> Result<FaqEntry, RegistryError> {
    let keywords: BTreeSet<String> = draft
        .keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect();
    Ok(FaqEntry {
        id,
        question: required_text("question", &draft.question)?,
        answer: required_text("answer", &draft.answer)?,
        category: draft
            .category
            .map(|category| category.trim().to_lowercase())
            .filter(|category| !category.is_empty())
            .unwrap_or_else(|| "general".to_string()),
        keywords: keywords.into_iter().collect(),
    })
}

impl FaqBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book seeded with the standard resident questions.
    pub fn with_defaults() -> Self {
        let book = Self::new();
        let seeds = [
            (
                "How do I pay my maintenance bill?",
                "Open Bills, pick the pending bill and choose Pay. Paid bills show a receipt date.",
                "billing",
                &["bill", "payment", "maintenance", "dues"][..],
            ),
            (
                "How do I raise a complaint?",
                "Go to Complaints and file a new one with a category and priority. The committee updates its status as work progresses.",
                "complaints",
                &["complaint", "issue", "repair"][..],
            ),
            (
                "Can I vote more than once in a poll?",
                "No. Each resident can complete a poll or survey once; later submissions are rejected.",
                "polls",
                &["poll", "vote", "survey"][..],
            ),
            (
                "How do I register a vehicle for parking?",
                "Add it under Vehicles with its registration number. Your first vehicle becomes the primary one.",
                "parking",
                &["vehicle", "parking", "car", "sticker"][..],
            ),
        ];
        for (question, answer, category, keywords) in seeds {
            // Seeds are static and valid.
            let _ = book.add(FaqDraft {
                question: question.to_string(),
                answer: answer.to_string(),
                category: Some(category.to_string()),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            });
        }
        book
    }

    fn lock(&self) -> Result<MutexGuard<'_, FaqShelf>, RegistryError> {
        self.shelf.lock().map_err(|_| {
            RegistryError::Repository(RepositoryError::Unavailable(
                "faq book mutex poisoned".to_string(),
            ))
        })
    }

    pub fn add(&self, draft: FaqDraft) -> Result<FaqEntry, RegistryError> {
        let mut shelf = self.lock()?;
        let entry = entry_from(shelf.next_id + 1, draft)?;
        shelf.next_id = entry.id;
        shelf.entries.push(entry.clone());
        Ok(entry)
    }

    pub fn update(&self, id: u64, draft: FaqDraft) -> Result<FaqEntry, RegistryError> {
        let mut shelf = self.lock()?;
        let slot = shelf
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(RegistryError::NotFound("faq"))?;
        *slot = entry_from(id, draft)?;
        Ok(slot.clone())
    }

    pub fn remove(&self, id: u64) -> Result<(), RegistryError> {
        let mut shelf = self.lock()?;
        let before = shelf.entries.len();
        shelf.entries.retain(|entry| entry.id != id);
        if shelf.entries.len() == before {
            return Err(RegistryError::NotFound("faq"));
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<FaqEntry>, RegistryError> {
        Ok(self.lock()?.entries.clone())
    }

    /// Rank entries by keyword, question and answer overlap with `query`.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<FaqMatch>, RegistryError> {
        let words = tokens(query);
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let shelf = self.lock()?;
        let mut matches: Vec<FaqMatch> = shelf
            .entries
            .iter()
            .filter_map(|entry| {
                let question = tokens(&entry.question);
                let answer = tokens(&entry.answer);
                let score = words
                    .iter()
                    .map(|word| {
                        let keyword = entry.keywords.iter().any(|k| k == word);
                        u32::from(keyword) * KEYWORD_WEIGHT
                            + u32::from(question.contains(word)) * QUESTION_WEIGHT
                            + u32::from(answer.contains(word)) * ANSWER_WEIGHT
                    })
                    .sum::<u32>();
                (score > 0).then(|| FaqMatch {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score).then(a.entry.id.cmp(&b.entry.id)));
        matches.truncate(limit);
        debug!(query, hits = matches.len(), "faq search");
        Ok(matches)
    }
}

impl RegistryService {
    pub fn add_faq(&self, ctx: &ActorContext, draft: FaqDraft) -> Result<FaqEntry, RegistryError> {
        require_admin(ctx, "edit the FAQ")?;
        self.faqs.add(draft)
    }

    pub fn update_faq(
        &self,
        ctx: &ActorContext,
        id: u64,
        draft: FaqDraft,
    ) -> Result<FaqEntry, RegistryError> {
        require_admin(ctx, "edit the FAQ")?;
        self.faqs.update(id, draft)
    }

    pub fn remove_faq(&self, ctx: &ActorContext, id: u64) -> Result<(), RegistryError> {
        require_admin(ctx, "edit the FAQ")?;
        self.faqs.remove(id)
    }
}
