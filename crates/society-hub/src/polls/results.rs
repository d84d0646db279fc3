use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{OptionId, PollOption};

/// Rendered tally for one option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub option_id: OptionId,
    pub option_text: String,
    pub vote_count: u64,
    pub percentage: f64,
}

/// Build per-option results in display order.
///
/// Percentages are rounded to two decimals and are all zero when nobody voted.
pub fn tally(options: &[PollOption], votes: &BTreeMap<OptionId, u64>) -> Vec<OptionResult> {
    let total: u64 = options
        .iter()
        .map(|option| votes.get(&option.id).copied().unwrap_or(0))
        .sum();

    options
        .iter()
        .map(|option| {
            let vote_count = votes.get(&option.id).copied().unwrap_or(0);
            OptionResult {
                option_id: option.id.clone(),
                option_text: option.text.clone(),
                vote_count,
                percentage: percentage(vote_count, total),
            }
        })
        .collect()
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}
