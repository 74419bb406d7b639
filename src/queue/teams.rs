//! Team blocks for team mode
//!
//! Participants sharing a team id are placed as one block. Participants
//! without a team form blocks of one.

use crate::types::ParticipantId;
use crate::utils::mean_rank;
use std::collections::HashMap;

/// A participant eligible for this pass, already sorted by rank
#[derive(Debug, Clone)]
pub struct Candidate {
    pub participant_id: ParticipantId,
    pub rank: f64,
    pub team_id: Option<String>,
}

/// Participants that must land in the same group
#[derive(Debug, Clone)]
pub struct TeamBlock {
    pub team_id: Option<String>,
    pub members: Vec<(ParticipantId, f64)>,
    pub average_rank: f64,
}

impl TeamBlock {
    pub fn new(team_id: Option<String>, members: Vec<(ParticipantId, f64)>) -> Self {
        let ranks: Vec<f64> = members.iter().map(|(_, rank)| *rank).collect();
        Self {
            team_id,
            average_rank: mean_rank(&ranks),
            members,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Aggregate rank-sorted candidates into blocks sorted by average rank
pub fn build_blocks(candidates: Vec<Candidate>) -> Vec<TeamBlock> {
    let mut grouped: Vec<(Option<String>, Vec<(ParticipantId, f64)>)> = Vec::new();
    let mut by_team: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let member = (candidate.participant_id, candidate.rank);
        match candidate.team_id {
            Some(team_id) => match by_team.get(&team_id) {
                Some(&index) => grouped[index].1.push(member),
                None => {
                    by_team.insert(team_id.clone(), grouped.len());
                    grouped.push((Some(team_id), vec![member]));
                }
            },
            None => grouped.push((None, vec![member])),
        }
    }

    let mut blocks: Vec<TeamBlock> = grouped
        .into_iter()
        .map(|(team_id, members)| TeamBlock::new(team_id, members))
        .collect();
    blocks.sort_by(|a, b| a.average_rank.total_cmp(&b.average_rank));
    blocks
}
