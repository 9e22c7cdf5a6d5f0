use crate::voting::{Outcome, TallyResult};

/// Single-choice decision: the affirmative option must hold a strict majority
/// of the votes actually cast. Abstentions don't count against it, since only
/// cast ballots are in `total_votes`.
pub fn decide(affirmative_option_id: &str, tally: &TallyResult) -> Outcome {
    let affirmative = tally.votes_for(affirmative_option_id).unwrap_or(0);

    if affirmative * 2 > tally.total_votes {
        Outcome::Approved
    } else {
        Outcome::Rejected
    }
}
