use crate::voting::{Outcome, TallyResult};

/// Multiple-choice decision. The option with the most votes is elected. When
/// several share the top count they are all reported as tied, in poll option
/// order, and nobody is picked.
pub fn decide(tally: &TallyResult) -> Outcome {
    let top = tally.per_option.iter().map(|entry| entry.votes).max().unwrap_or(0);

    let mut leaders: Vec<String> = tally
        .per_option
        .iter()
        .filter(|entry| entry.votes == top)
        .map(|entry| entry.option_id.clone())
        .collect();

    if leaders.len() == 1 {
        Outcome::Elected {
            option_id: leaders.remove(0),
        }
    } else {
        Outcome::Tied { option_ids: leaders }
    }
}
