use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    /// Yes/no style question decided by the affirmative option's majority.
    SingleChoice,
    /// Election between candidates decided by plurality.
    MultipleChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Draft,
    Open,
    Closed,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Draft => "draft",
            PollState::Open => "open",
            PollState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub label: String,
}

impl PollOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Supporting document shown alongside a poll (budget, project, proposals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// What a caller submits to `create_poll`. Everything the engine assigns
/// itself (id, state, timestamps) lives on [`Poll`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollDefinition {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: PollKind,
    pub options: Vec<PollOption>,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub quorum_required_pct: u8,
    pub eligible_voter_count: u32,
    // Single-choice only; defaults to the first option.
    #[serde(default)]
    pub affirmative_option_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl PollDefinition {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".to_string()));
        }
        if self.opens_at >= self.closes_at {
            return Err(EngineError::Validation(format!(
                "opens_at ({}) must be before closes_at ({})",
                self.opens_at.to_rfc3339(),
                self.closes_at.to_rfc3339()
            )));
        }
        if self.options.len() < 2 {
            return Err(EngineError::Validation(format!(
                "a poll needs at least 2 options, got {}",
                self.options.len()
            )));
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if option.id.trim().is_empty() {
                return Err(EngineError::Validation("option ids must not be empty".to_string()));
            }
            if !seen.insert(option.id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "duplicate option id '{}'",
                    option.id
                )));
            }
        }

        if self.quorum_required_pct > 100 {
            return Err(EngineError::Validation(format!(
                "quorum_required_pct must be within 0..=100, got {}",
                self.quorum_required_pct
            )));
        }
        if self.eligible_voter_count == 0 {
            return Err(EngineError::Validation(
                "eligible_voter_count must be positive".to_string(),
            ));
        }
        if self.attachments.iter().any(|attachment| attachment.name.trim().is_empty()) {
            return Err(EngineError::Validation(
                "attachment names must not be empty".to_string(),
            ));
        }
        if let Some(affirmative) = &self.affirmative_option_id {
            if !seen.contains(affirmative.as_str()) {
                return Err(EngineError::Validation(format!(
                    "affirmative option '{}' is not one of the poll options",
                    affirmative
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: PollKind,
    pub options: Vec<PollOption>,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub quorum_required_pct: u8,
    pub eligible_voter_count: u32,
    pub affirmative_option_id: String,
    pub created_by: Option<String>,
    pub attachments: Vec<Attachment>,
    pub state: PollState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub audited: bool,
}

impl Poll {
    /// Builds a Draft poll from an already validated definition.
    pub fn new(definition: PollDefinition) -> Self {
        let affirmative_option_id = definition
            .affirmative_option_id
            .or_else(|| definition.options.first().map(|option| option.id.clone()))
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4().to_string(),
            title: definition.title,
            description: definition.description,
            kind: definition.kind,
            options: definition.options,
            opens_at: definition.opens_at,
            closes_at: definition.closes_at,
            quorum_required_pct: definition.quorum_required_pct,
            eligible_voter_count: definition.eligible_voter_count,
            affirmative_option_id,
            created_by: definition.created_by,
            attachments: definition.attachments,
            state: PollState::Draft,
            created_at: Utc::now(),
            closed_at: None,
            audited: false,
        }
    }

    pub fn option_position(&self, option_id: &str) -> Option<usize> {
        self.options.iter().position(|option| option.id == option_id)
    }

    pub fn accepts_votes_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.opens_at && at <= self.closes_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == PollState::Open && self.closes_at < now
    }

    /// True while the poll is open and its deadline falls within `window` of `now`.
    pub fn is_closing_soon(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.state != PollState::Open {
            return false;
        }
        let remaining = self.closes_at - now;
        remaining > Duration::zero() && remaining <= window
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub poll_id: String,
    pub voter_id: String,
    pub option_id: String,
    pub cast_at: DateTime<Utc>,
}

/// Row for "who voted" listings; never exposes the chosen option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterEntry {
    pub voter_id: String,
    pub cast_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn definition() -> PollDefinition {
        PollDefinition {
            title: "Pintura das áreas comuns".to_string(),
            description: String::new(),
            kind: PollKind::SingleChoice,
            options: vec![
                PollOption::new("sim", "Sim, aprovo"),
                PollOption::new("nao", "Não aprovo"),
            ],
            opens_at: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            closes_at: Utc.with_ymd_and_hms(2025, 10, 5, 18, 0, 0).unwrap(),
            quorum_required_pct: 50,
            eligible_voter_count: 120,
            affirmative_option_id: None,
            created_by: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn valid_definition_passes() {
        assert!(definition().validate().is_ok());
    }

    #[rstest]
    #[case::empty_title(|d: &mut PollDefinition| d.title = "  ".to_string())]
    #[case::window_inverted(|d: &mut PollDefinition| d.closes_at = d.opens_at)]
    #[case::single_option(|d: &mut PollDefinition| { d.options.truncate(1); })]
    #[case::duplicate_option(|d: &mut PollDefinition| d.options[1].id = "sim".to_string())]
    #[case::blank_option_id(|d: &mut PollDefinition| d.options[0].id = String::new())]
    #[case::quorum_over_100(|d: &mut PollDefinition| d.quorum_required_pct = 101)]
    #[case::no_eligible_voters(|d: &mut PollDefinition| d.eligible_voter_count = 0)]
    #[case::blank_attachment(
        |d: &mut PollDefinition| d.attachments.push(Attachment::new(" ", None))
    )]
    #[case::unknown_affirmative(
        |d: &mut PollDefinition| d.affirmative_option_id = Some("talvez".to_string())
    )]
    fn invalid_definitions_are_rejected(#[case] mutate: fn(&mut PollDefinition)) {
        let mut def = definition();
        mutate(&mut def);
        assert!(matches!(def.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn new_poll_starts_as_draft_with_default_affirmative() {
        let poll = Poll::new(definition());
        assert_eq!(poll.state, PollState::Draft);
        assert_eq!(poll.affirmative_option_id, "sim");
        assert!(!poll.audited);
        assert!(Uuid::parse_str(&poll.id).is_ok());
    }

    #[test]
    fn voting_window_is_inclusive() {
        let poll = Poll::new(definition());
        assert!(poll.accepts_votes_at(poll.opens_at));
        assert!(poll.accepts_votes_at(poll.closes_at));
        assert!(!poll.accepts_votes_at(poll.closes_at + Duration::seconds(1)));
        assert!(!poll.accepts_votes_at(poll.opens_at - Duration::seconds(1)));
    }

    #[rstest]
    #[case(Duration::hours(30), false)]
    #[case(Duration::hours(24), true)]
    #[case(Duration::minutes(5), true)]
    #[case(Duration::zero(), false)]
    fn closing_soon_window(#[case] before_close: Duration, #[case] expected: bool) {
        let mut poll = Poll::new(definition());
        poll.state = PollState::Open;
        let now = poll.closes_at - before_close;
        assert_eq!(poll.is_closing_soon(now, Duration::hours(24)), expected);
    }

    #[test]
    fn closing_soon_ignores_non_open_polls() {
        let poll = Poll::new(definition());
        let now = poll.closes_at - Duration::hours(1);
        assert!(!poll.is_closing_soon(now, Duration::hours(24)));
    }
}
