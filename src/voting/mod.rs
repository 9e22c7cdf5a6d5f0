pub mod minutes;
pub mod plurality;
pub mod referendum;

use serde::{Deserialize, Serialize};

use crate::models::{Poll, PollKind, PollState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Poll is still in Draft or Open.
    Pending,
    Approved,
    Rejected,
    QuorumNotMet,
    Elected { option_id: String },
    Tied { option_ids: Vec<String> },
}

// Vote count for one option, in poll option order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option_id: String,
    pub label: String,
    pub votes: u64,
    /// Share of cast votes, not of eligible voters.
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    pub poll_id: String,
    pub state: PollState,
    pub per_option: Vec<OptionTally>,
    pub total_votes: u64,
    pub eligible_voter_count: u32,
    pub participation_pct: f64,
    pub quorum_required_pct: u8,
    pub quorum_met: bool,
    pub outcome: Outcome,
}

impl TallyResult {
    pub fn votes_for(&self, option_id: &str) -> Option<u64> {
        self.per_option
            .iter()
            .find(|entry| entry.option_id == option_id)
            .map(|entry| entry.votes)
    }
}

/// `part / whole * 100`, or 0 when nothing has been counted yet.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Integer form of `total / eligible * 100 >= required` so that boundary
/// cases such as 60 of 120 at 50% don't depend on float rounding.
pub fn quorum_met(total_votes: u64, eligible_voter_count: u32, quorum_required_pct: u8) -> bool {
    total_votes * 100 >= u64::from(quorum_required_pct) * u64::from(eligible_voter_count)
}

/// Live tally for `poll` given per-option counts indexed like `poll.options`.
/// The outcome is always `Pending`; see [`finalize`] for the closing decision.
pub fn tally(poll: &Poll, counts: &[u64]) -> TallyResult {
    let total_votes: u64 = counts.iter().sum();

    let per_option = poll
        .options
        .iter()
        .zip(counts)
        .map(|(option, &votes)| OptionTally {
            option_id: option.id.clone(),
            label: option.label.clone(),
            votes,
            share_pct: percentage(votes, total_votes),
        })
        .collect();

    TallyResult {
        poll_id: poll.id.clone(),
        state: poll.state,
        per_option,
        total_votes,
        eligible_voter_count: poll.eligible_voter_count,
        participation_pct: percentage(total_votes, u64::from(poll.eligible_voter_count)),
        quorum_required_pct: poll.quorum_required_pct,
        quorum_met: quorum_met(total_votes, poll.eligible_voter_count, poll.quorum_required_pct),
        outcome: Outcome::Pending,
    }
}

/// Applies the closing policy to a live tally. Quorum is checked first and
/// overrides any majority or plurality.
pub fn finalize(poll: &Poll, live: TallyResult) -> TallyResult {
    let outcome = if !live.quorum_met {
        Outcome::QuorumNotMet
    } else {
        match poll.kind {
            PollKind::SingleChoice => referendum::decide(&poll.affirmative_option_id, &live),
            PollKind::MultipleChoice => plurality::decide(&live),
        }
    };

    TallyResult {
        state: PollState::Closed,
        outcome,
        ..live
    }
}
