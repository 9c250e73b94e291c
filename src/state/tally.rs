//! Vote tally and winner resolution.
//!
//! Pure and deterministic: suggestions are ordered by `(created_at, id)` and votes by
//! `(created_at, id)` before counting, so the result never depends on input order.

use std::collections::HashSet;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::round::{Suggestion, Vote};

/// Count and share of the votes received by one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionTally {
    pub votes: u32,
    /// Share of all counted votes, rounded half-up to a whole percent.
    pub percentage: u32,
}

/// Outcome of tallying the votes of a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinnerResolution {
    /// Per-suggestion tallies in display order.
    pub tallies: IndexMap<Uuid, SuggestionTally>,
    pub max_votes: u32,
    /// Suggestions sharing `max_votes`; empty when nobody voted.
    pub winners: Vec<Uuid>,
    pub is_tie: bool,
    pub has_votes: bool,
    pub total_votes: u32,
}

impl WinnerResolution {
    /// The winner when exactly one suggestion leads.
    pub fn single_winner(&self) -> Option<Uuid> {
        match self.winners.as_slice() {
            [winner] => Some(*winner),
            _ => None,
        }
    }
}

/// Tally `votes` over `suggestions`.
///
/// Votes targeting unknown suggestions are ignored. A voter counts once: the earliest of
/// their valid votes wins.
pub fn resolve(suggestions: &[Suggestion], votes: &[Vote]) -> WinnerResolution {
    let mut ordered: Vec<&Suggestion> = suggestions.iter().collect();
    ordered.sort_by_key(|suggestion| (suggestion.created_at, suggestion.id));

    let mut counts: IndexMap<Uuid, u32> = ordered
        .iter()
        .map(|suggestion| (suggestion.id, 0))
        .collect();

    let mut ordered_votes: Vec<&Vote> = votes.iter().collect();
    ordered_votes.sort_by_key(|vote| (vote.created_at, vote.id));

    let mut seen_voters = HashSet::new();
    let mut total_votes = 0u32;
    for vote in ordered_votes {
        let Some(count) = counts.get_mut(&vote.suggestion_id) else {
            continue;
        };
        if !seen_voters.insert(vote.voter_id) {
            continue;
        }
        *count += 1;
        total_votes += 1;
    }

    let max_votes = counts.values().copied().max().unwrap_or(0);
    let winners: Vec<Uuid> = if max_votes > 0 {
        counts
            .iter()
            .filter(|(_, count)| **count == max_votes)
            .map(|(id, _)| *id)
            .collect()
    } else {
        Vec::new()
    };

    let tallies = counts
        .into_iter()
        .map(|(id, votes)| {
            (
                id,
                SuggestionTally {
                    votes,
                    percentage: percentage(votes, total_votes),
                },
            )
        })
        .collect();

    WinnerResolution {
        tallies,
        max_votes,
        is_tie: winners.len() > 1,
        winners,
        has_votes: total_votes > 0,
        total_votes,
    }
}

fn percentage(count: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (count, total) = (u64::from(count), u64::from(total));
    ((count * 200 + total) / (total * 2)) as u32
}
