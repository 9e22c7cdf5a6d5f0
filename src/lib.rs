//! Ballot tally engine for condominium assemblies: polls, one ballot per
//! voter with recasts while open, live quorum and participation, and a frozen
//! result once a poll closes.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod seed;
pub mod store;
pub mod tasks;
pub mod voting;

pub use engine::{Dashboard, Engine};
pub use error::EngineError;
pub use models::{
    Attachment, Ballot, Poll, PollDefinition, PollKind, PollOption, PollState, VoterEntry,
};
pub use voting::{OptionTally, Outcome, TallyResult};
