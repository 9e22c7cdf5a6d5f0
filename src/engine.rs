use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::EngineError;
use crate::models::{Ballot, Poll, PollDefinition, PollState, VoterEntry};
use crate::store::PollStore;
use crate::voting::{self, TallyResult};

/// Counters behind the building manager's dashboard cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub draft: usize,
    pub open: usize,
    pub closed: usize,
    /// Mean participation over polls that have been published.
    pub average_participation_pct: Option<f64>,
}

/// Owns every poll and its ballots. Callers hold one `Engine` (usually behind
/// an `Arc`) and go through it for every read and write.
#[derive(Debug, Default)]
pub struct Engine {
    store: PollStore,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_poll(&self, definition: PollDefinition) -> Result<Poll, EngineError> {
        definition.validate()?;
        let poll = Poll::new(definition);
        info!("Created poll {} ({:?}): {}", poll.id, poll.kind, poll.title);
        self.store.insert(poll.clone());
        Ok(poll)
    }

    pub fn publish(&self, poll_id: &str) -> Result<Poll, EngineError> {
        let poll = self.store.write(poll_id, |slot| {
            slot.publish()?;
            Ok(slot.poll().clone())
        })?;
        info!("Published poll {}", poll_id);
        Ok(poll)
    }

    /// Closes an open poll and freezes its result.
    pub fn close(&self, poll_id: &str, at: DateTime<Utc>) -> Result<TallyResult, EngineError> {
        let result = self.store.write(poll_id, |slot| slot.close(at).cloned())?;
        info!(
            "Closed poll {} with {} of {} votes: {:?}",
            poll_id, result.total_votes, result.eligible_voter_count, result.outcome
        );
        Ok(result)
    }

    /// Closes every open poll whose deadline passed before `now`.
    pub fn close_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let closed = self.store.close_expired(now);
        for poll_id in &closed {
            info!("Closed expired poll {}", poll_id);
        }
        closed
    }

    pub fn mark_audited(&self, poll_id: &str) -> Result<Poll, EngineError> {
        let (poll, changed) = self.store.write(poll_id, |slot| {
            let changed = slot.mark_audited()?;
            Ok((slot.poll().clone(), changed))
        })?;
        if changed {
            info!("Poll {} marked as audited", poll_id);
        }
        Ok(poll)
    }

    pub fn cast_vote(
        &self,
        poll_id: &str,
        voter_id: &str,
        option_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Ballot, EngineError> {
        let result = self
            .store
            .write(poll_id, |slot| slot.cast(voter_id, option_id, at));
        match &result {
            Ok(ballot) => debug!(
                "Voter {} cast '{}' on poll {}",
                voter_id, ballot.option_id, poll_id
            ),
            Err(e) => warn!("Rejected vote from {} on poll {}: {}", voter_id, poll_id, e),
        }
        result
    }

    /// The voter's current ballot, if any. Unknown polls simply have no vote.
    pub fn get_vote(&self, poll_id: &str, voter_id: &str) -> Option<Ballot> {
        self.store
            .read(poll_id, |slot| slot.ballot(voter_id).cloned())
            .ok()
            .flatten()
    }

    pub fn get_poll(&self, poll_id: &str) -> Result<Poll, EngineError> {
        self.store.read(poll_id, |slot| slot.poll().clone())
    }

    pub fn get_live_tally(&self, poll_id: &str) -> Result<TallyResult, EngineError> {
        self.store.read(poll_id, |slot| slot.tally())
    }

    pub fn list_ballots_by_poll(&self, poll_id: &str) -> Result<Vec<VoterEntry>, EngineError> {
        self.store.read(poll_id, |slot| slot.voters())
    }

    pub fn list_polls(&self, filter: Option<PollState>) -> Vec<Poll> {
        self.store
            .polls()
            .into_iter()
            .filter(|poll| filter.is_none_or(|state| poll.state == state))
            .collect()
    }

    pub fn closing_soon(&self, now: DateTime<Utc>, window: Duration) -> Vec<Poll> {
        self.list_polls(Some(PollState::Open))
            .into_iter()
            .filter(|poll| poll.is_closing_soon(now, window))
            .collect()
    }

    pub fn dashboard(&self) -> Dashboard {
        let mut dashboard = Dashboard {
            draft: 0,
            open: 0,
            closed: 0,
            average_participation_pct: None,
        };
        let mut published = 0usize;
        let mut participation_sum = 0.0;

        for summary in self.store.summaries() {
            match summary.state {
                PollState::Draft => dashboard.draft += 1,
                PollState::Open => dashboard.open += 1,
                PollState::Closed => dashboard.closed += 1,
            }
            if let Some(pct) = summary.participation_pct {
                published += 1;
                participation_sum += pct;
            }
        }

        if published > 0 {
            dashboard.average_participation_pct = Some(participation_sum / published as f64);
        }
        dashboard
    }

    /// Printable minutes with a footer stamped `generated_at` and a hash of
    /// the body, checkable with [`voting::minutes::verify`].
    pub fn minutes(
        &self,
        poll_id: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        self.store.read(poll_id, |slot| {
            voting::minutes::render(slot.poll(), &slot.tally(), generated_at)
        })
    }
}
