//! Vote tallying. Pure; elimination is applied by the controller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::session::{Player, Vote};
use crate::core::game::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub target: PlayerId,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResult {
    pub eliminated: Option<PlayerId>,
    /// Non-zero counts in roster order
    pub counts: Vec<VoteCount>,
    pub is_tie: bool,
    pub narrative: String,
}

pub fn tally(votes: &[Vote], roster: &[Player]) -> VoteResult {
    let alive = |id: PlayerId| roster.iter().any(|p| p.id == id && p.is_alive);
    let name_of = |id: PlayerId| {
        roster
            .iter()
            .find(|p| p.id == id)
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    };

    let mut per_target: BTreeMap<PlayerId, u32> = BTreeMap::new();
    for v in votes.iter().filter(|v| alive(v.voter) && alive(v.target)) {
        *per_target.entry(v.target).or_default() += 1;
    }
    let counts: Vec<VoteCount> = roster
        .iter()
        .filter_map(|p| per_target.get(&p.id).map(|&n| VoteCount { target: p.id, votes: n }))
        .collect();

    let Some(max) = counts.iter().map(|c| c.votes).max() else {
        return VoteResult {
            eliminated: None,
            counts,
            is_tie: false,
            narrative: "No votes were cast.".into(),
        };
    };
    let leaders: Vec<PlayerId> = counts.iter().filter(|c| c.votes == max).map(|c| c.target).collect();

    if let [only] = *leaders.as_slice() {
        let noun = if max == 1 { "vote" } else { "votes" };
        VoteResult {
            eliminated: Some(only),
            narrative: format!("The town voted out {} with {max} {noun}.", name_of(only)),
            counts,
            is_tie: false,
        }
    } else {
        let names: Vec<String> = leaders.iter().map(|id| name_of(*id)).collect();
        VoteResult {
            eliminated: None,
            narrative: format!("The vote was tied between {}. No one was eliminated.", names.join(" and ")),
            counts,
            is_tie: true,
        }
    }
}
