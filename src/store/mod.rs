use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::EngineError;
use crate::models::{Ballot, Poll, PollState, VoterEntry};
use crate::voting::{self, TallyResult};

/// Everything the engine knows about one poll. Counts are kept in step with
/// `ballots` so a cast never has to rescan the ballots.
#[derive(Debug)]
pub struct PollSlot {
    seq: u64,
    poll: Poll,
    ballots: HashMap<String, Ballot>,
    // Indexed like poll.options
    counts: Vec<u64>,
    last_cast_at: Option<DateTime<Utc>>,
    final_tally: Option<TallyResult>,
}

impl PollSlot {
    fn new(seq: u64, poll: Poll) -> Self {
        let counts = vec![0; poll.options.len()];
        Self {
            seq,
            poll,
            ballots: HashMap::new(),
            counts,
            last_cast_at: None,
            final_tally: None,
        }
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    pub fn total_votes(&self) -> u64 {
        self.ballots.len() as u64
    }

    pub fn ballot(&self, voter_id: &str) -> Option<&Ballot> {
        self.ballots.get(voter_id)
    }

    pub fn voters(&self) -> Vec<VoterEntry> {
        let mut voters: Vec<VoterEntry> = self
            .ballots
            .values()
            .map(|ballot| VoterEntry {
                voter_id: ballot.voter_id.clone(),
                cast_at: ballot.cast_at,
            })
            .collect();
        voters.sort_by(|a, b| {
            a.cast_at
                .cmp(&b.cast_at)
                .then_with(|| a.voter_id.cmp(&b.voter_id))
        });
        voters
    }

    /// Frozen result once closed, otherwise a fresh live tally.
    pub fn tally(&self) -> TallyResult {
        match &self.final_tally {
            Some(result) => result.clone(),
            None => voting::tally(&self.poll, &self.counts),
        }
    }

    pub fn publish(&mut self) -> Result<(), EngineError> {
        self.transition(PollState::Draft, "publish")?;
        self.poll.state = PollState::Open;
        Ok(())
    }

    /// Freezes the result. `closed_at` never precedes the latest accepted
    /// ballot, so a back-dated close still yields a coherent record.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<&TallyResult, EngineError> {
        self.transition(PollState::Open, "close")?;

        let closed_at = self.last_cast_at.map_or(at, |last| at.max(last));
        let live = voting::tally(&self.poll, &self.counts);
        self.poll.state = PollState::Closed;
        self.poll.closed_at = Some(closed_at);
        Ok(&*self.final_tally.insert(voting::finalize(&self.poll, live)))
    }

    /// Returns whether the flag changed.
    pub fn mark_audited(&mut self) -> Result<bool, EngineError> {
        self.transition(PollState::Closed, "be audited")?;
        let changed = !self.poll.audited;
        self.poll.audited = true;
        Ok(changed)
    }

    fn transition(&self, expected: PollState, action: &'static str) -> Result<(), EngineError> {
        if self.poll.state != expected {
            return Err(EngineError::InvalidStateTransition {
                poll_id: self.poll.id.clone(),
                from: self.poll.state,
                action,
            });
        }
        Ok(())
    }

    /// Inserts or replaces the voter's ballot. All checks run before any
    /// write, so a rejected cast leaves the slot untouched.
    pub fn cast(
        &mut self,
        voter_id: &str,
        option_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Ballot, EngineError> {
        match self.poll.state {
            PollState::Closed => {
                return Err(EngineError::PollClosed {
                    poll_id: self.poll.id.clone(),
                });
            }
            PollState::Draft => {
                return Err(EngineError::PollNotOpen {
                    poll_id: self.poll.id.clone(),
                });
            }
            PollState::Open => {}
        }
        if !self.poll.accepts_votes_at(at) {
            return Err(EngineError::PollNotOpen {
                poll_id: self.poll.id.clone(),
            });
        }

        let new_index = self
            .poll
            .option_position(option_id)
            .ok_or_else(|| EngineError::UnknownOption {
                poll_id: self.poll.id.clone(),
                option_id: option_id.to_string(),
            })?;

        if let Some(existing) = self.ballots.get_mut(voter_id) {
            // Recast: move one vote between options; total is unchanged.
            if let Some(old_index) = self.poll.option_position(&existing.option_id) {
                self.counts[old_index] -= 1;
            }
            self.counts[new_index] += 1;
            existing.option_id = option_id.to_string();
            existing.cast_at = at;
            let ballot = existing.clone();
            self.note_cast(at);
            return Ok(ballot);
        }

        if self.total_votes() >= u64::from(self.poll.eligible_voter_count) {
            return Err(EngineError::EligibilityExhausted {
                poll_id: self.poll.id.clone(),
                eligible: self.poll.eligible_voter_count,
            });
        }

        let ballot = Ballot {
            poll_id: self.poll.id.clone(),
            voter_id: voter_id.to_string(),
            option_id: option_id.to_string(),
            cast_at: at,
        };
        self.counts[new_index] += 1;
        self.ballots.insert(voter_id.to_string(), ballot.clone());
        self.note_cast(at);
        Ok(ballot)
    }

    fn note_cast(&mut self, at: DateTime<Utc>) {
        self.last_cast_at = Some(self.last_cast_at.map_or(at, |last| last.max(at)));
    }
}

/// State and participation of one poll, read under a single lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSummary {
    pub state: PollState,
    /// `None` while the poll is still a draft.
    pub participation_pct: Option<f64>,
}

/// Concurrent map of polls. Each poll sits behind its own lock, so writers on
/// different polls never contend.
#[derive(Debug, Default)]
pub struct PollStore {
    polls: DashMap<String, Arc<RwLock<PollSlot>>>,
    next_seq: AtomicU64,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, poll: Poll) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.polls
            .insert(poll.id.clone(), Arc::new(RwLock::new(PollSlot::new(seq, poll))));
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    // Clone the Arc out so the map shard isn't held while waiting on the poll lock.
    fn slot(&self, poll_id: &str) -> Option<Arc<RwLock<PollSlot>>> {
        self.polls.get(poll_id).map(|entry| Arc::clone(entry.value()))
    }

    fn all_slots(&self) -> Vec<Arc<RwLock<PollSlot>>> {
        self.polls.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn read<T>(
        &self,
        poll_id: &str,
        f: impl FnOnce(&PollSlot) -> T,
    ) -> Result<T, EngineError> {
        let slot = self
            .slot(poll_id)
            .ok_or_else(|| EngineError::PollNotFound(poll_id.to_string()))?;
        let guard = read_guard(&slot);
        Ok(f(&*guard))
    }

    pub fn write<T>(
        &self,
        poll_id: &str,
        f: impl FnOnce(&mut PollSlot) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let slot = self
            .slot(poll_id)
            .ok_or_else(|| EngineError::PollNotFound(poll_id.to_string()))?;
        let mut guard = write_guard(&slot);
        f(&mut *guard)
    }

    /// Snapshot of every poll, in creation order.
    pub fn polls(&self) -> Vec<Poll> {
        let mut snapshot: Vec<(u64, Poll)> = self
            .all_slots()
            .iter()
            .map(|slot| {
                let guard = read_guard(slot);
                (guard.seq, guard.poll.clone())
            })
            .collect();
        snapshot.sort_by_key(|(seq, _)| *seq);
        snapshot.into_iter().map(|(_, poll)| poll).collect()
    }

    /// One summary per poll. State and participation come from the same
    /// guard, so a poll closing mid-scan is never counted twice or missed.
    pub fn summaries(&self) -> Vec<PollSummary> {
        self.all_slots()
            .iter()
            .map(|slot| {
                let guard = read_guard(slot);
                let state = guard.poll.state;
                PollSummary {
                    state,
                    participation_pct: (state != PollState::Draft)
                        .then(|| guard.tally().participation_pct),
                }
            })
            .collect()
    }

    /// Closes every open poll whose deadline is before `now`. Returns the
    /// closed polls' ids in creation order.
    pub fn close_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut closed: Vec<(u64, String)> = Vec::new();
        for slot in self.all_slots() {
            let mut guard = write_guard(&slot);
            // Re-checked under the write lock; a concurrent close may have won.
            if guard.poll.is_expired(now) && guard.close(now).is_ok() {
                closed.push((guard.seq, guard.poll.id.clone()));
            }
        }
        closed.sort_by_key(|(seq, _)| *seq);
        closed.into_iter().map(|(_, id)| id).collect()
    }
}

fn read_guard(slot: &RwLock<PollSlot>) -> RwLockReadGuard<'_, PollSlot> {
    slot.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard(slot: &RwLock<PollSlot>) -> RwLockWriteGuard<'_, PollSlot> {
    slot.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PollDefinition, PollKind, PollOption};
    use chrono::{Duration, TimeZone};

    fn opens() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
    }

    fn open_slot(eligible: u32) -> PollSlot {
        let poll = Poll::new(PollDefinition {
            title: "Câmeras de segurança".to_string(),
            description: String::new(),
            kind: PollKind::SingleChoice,
            options: vec![PollOption::new("sim", "Sim"), PollOption::new("nao", "Não")],
            opens_at: opens(),
            closes_at: opens() + Duration::days(3),
            quorum_required_pct: 50,
            eligible_voter_count: eligible,
            affirmative_option_id: None,
            created_by: None,
            attachments: Vec::new(),
        });
        let mut slot = PollSlot::new(0, poll);
        slot.publish().unwrap();
        slot
    }

    #[test]
    fn recast_moves_the_vote() {
        let mut slot = open_slot(10);
        let at = opens() + Duration::hours(1);

        slot.cast("apto-101", "sim", at).unwrap();
        assert_eq!(slot.counts, vec![1, 0]);

        let ballot = slot.cast("apto-101", "nao", at + Duration::hours(1)).unwrap();
        assert_eq!(ballot.option_id, "nao");
        assert_eq!(ballot.cast_at, at + Duration::hours(1));
        assert_eq!(slot.counts, vec![0, 1]);
        assert_eq!(slot.total_votes(), 1);
    }

    #[test]
    fn rejected_cast_leaves_slot_untouched() {
        let mut slot = open_slot(10);
        let at = opens() + Duration::hours(1);
        slot.cast("apto-101", "sim", at).unwrap();

        let err = slot.cast("apto-101", "talvez", at).unwrap_err();
        assert!(matches!(err, EngineError::UnknownOption { .. }));
        assert_eq!(slot.ballot("apto-101").unwrap().option_id, "sim");
        assert_eq!(slot.counts, vec![1, 0]);
    }

    #[test]
    fn eligibility_caps_first_time_ballots_but_not_recasts() {
        let mut slot = open_slot(2);
        let at = opens() + Duration::hours(1);
        slot.cast("a", "sim", at).unwrap();
        slot.cast("b", "sim", at).unwrap();

        let err = slot.cast("c", "sim", at).unwrap_err();
        assert_eq!(
            err,
            EngineError::EligibilityExhausted {
                poll_id: slot.poll().id.clone(),
                eligible: 2
            }
        );
        assert!(slot.cast("b", "nao", at).is_ok());
        assert_eq!(slot.counts, vec![1, 1]);
    }

    #[test]
    fn voters_are_listed_by_cast_time() {
        let mut slot = open_slot(10);
        slot.cast("apto-302", "sim", opens() + Duration::hours(5)).unwrap();
        slot.cast("apto-101", "nao", opens() + Duration::hours(2)).unwrap();
        slot.cast("apto-102", "sim", opens() + Duration::hours(5)).unwrap();

        let ids: Vec<String> = slot.voters().into_iter().map(|entry| entry.voter_id).collect();
        assert_eq!(ids, vec!["apto-101", "apto-102", "apto-302"]);
    }

    #[test]
    fn audit_requires_closed_poll_and_is_idempotent() {
        let mut slot = open_slot(10);
        assert!(matches!(
            slot.mark_audited(),
            Err(EngineError::InvalidStateTransition { from: PollState::Open, .. })
        ));

        slot.close(opens() + Duration::days(4)).unwrap();
        assert_eq!(slot.mark_audited(), Ok(true));
        assert_eq!(slot.mark_audited(), Ok(false));
        assert!(slot.poll().audited);
    }

    #[test]
    fn back_dated_close_is_clamped_to_latest_ballot() {
        let mut slot = open_slot(10);
        let last = opens() + Duration::hours(5);
        slot.cast("apto-101", "sim", opens() + Duration::hours(1)).unwrap();
        slot.cast("apto-102", "nao", last).unwrap();
        slot.cast("apto-101", "nao", opens() + Duration::hours(3)).unwrap();

        slot.close(opens() - Duration::days(30)).unwrap();
        assert_eq!(slot.poll().closed_at, Some(last));
    }

    #[test]
    fn close_without_ballots_keeps_requested_time() {
        let mut slot = open_slot(10);
        let at = opens() + Duration::days(2);
        slot.close(at).unwrap();
        assert_eq!(slot.poll().closed_at, Some(at));
    }

    #[test]
    fn summaries_pair_state_with_participation() {
        let store = PollStore::new();
        let mut draft = open_slot(10).poll().clone();
        draft.state = PollState::Draft;
        let open = open_slot(10).poll().clone();
        let (draft_id, open_id) = (draft.id.clone(), open.id.clone());
        store.insert(draft);
        store.insert(open);
        store
            .write(&open_id, |slot| slot.cast("apto-101", "sim", opens() + Duration::hours(1)))
            .unwrap();

        let mut summaries = store.summaries();
        summaries.sort_by_key(|summary| summary.participation_pct.is_some());
        assert_eq!(
            summaries,
            vec![
                PollSummary { state: PollState::Draft, participation_pct: None },
                PollSummary { state: PollState::Open, participation_pct: Some(10.0) },
            ]
        );
        assert!(store.read(&draft_id, |slot| slot.total_votes()).is_ok());
    }

    #[test]
    fn close_expired_only_touches_overdue_open_polls() {
        let store = PollStore::new();
        let mut ids = Vec::new();
        for publish in [true, true, false] {
            let slot = open_slot(10);
            let mut poll = slot.poll().clone();
            if !publish {
                poll.state = PollState::Draft;
            }
            ids.push(poll.id.clone());
            store.insert(poll);
        }

        let closed = store.close_expired(opens() + Duration::days(1));
        assert!(closed.is_empty());

        let closed = store.close_expired(opens() + Duration::days(5));
        assert_eq!(closed, vec![ids[0].clone(), ids[1].clone()]);

        let states: Vec<PollState> = store.polls().into_iter().map(|poll| poll.state).collect();
        assert_eq!(states, vec![PollState::Closed, PollState::Closed, PollState::Draft]);
        assert!(store.close_expired(opens() + Duration::days(6)).is_empty());
    }
}
