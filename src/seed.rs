use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::engine::Engine;
use crate::models::PollDefinition;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub polls: Vec<SeedPoll>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPoll {
    pub definition: PollDefinition,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub ballots: Vec<SeedBallot>,
    #[serde(default)]
    pub close_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SeedBallot {
    pub voter_id: String,
    pub option_id: String,
    pub cast_at: DateTime<Utc>,
}

pub fn load(path: &Path) -> Result<SeedFile, Box<dyn std::error::Error + Send + Sync>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seed file {}: {}", path.display(), e))?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<SeedFile, Box<dyn std::error::Error + Send + Sync>> {
    Ok(serde_json::from_str(raw)?)
}

/// Feeds the seed through the engine's normal write path. A bad poll
/// definition aborts the replay; a rejected ballot is logged and skipped.
pub fn replay(
    engine: &Engine,
    seed: SeedFile,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let mut created = Vec::with_capacity(seed.polls.len());

    for entry in seed.polls {
        let title = entry.definition.title.clone();
        let poll = engine
            .create_poll(entry.definition)
            .map_err(|e| format!("Seed poll '{}' rejected: {}", title, e))?;

        if entry.publish {
            engine.publish(&poll.id)?;
            for ballot in &entry.ballots {
                let cast =
                    engine.cast_vote(&poll.id, &ballot.voter_id, &ballot.option_id, ballot.cast_at);
                if let Err(e) = cast {
                    warn!("Skipping seed ballot from {} on '{}': {}", ballot.voter_id, title, e);
                }
            }
            if let Some(at) = entry.close_at {
                engine.close(&poll.id, at)?;
            }
        } else if !entry.ballots.is_empty() {
            warn!(
                "Seed poll '{}' is not published; ignoring {} ballot(s)",
                title,
                entry.ballots.len()
            );
        }

        created.push(poll.id);
    }

    info!("Seeded {} poll(s)", created.len());
    Ok(created)
}
