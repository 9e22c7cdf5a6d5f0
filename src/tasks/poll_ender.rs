use crate::engine::Engine;
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::interval;

/// Periodically closes polls whose deadline has passed. Runs until the
/// surrounding task is dropped or aborted.
pub async fn check_expired_polls_task(engine: Arc<Engine>, every: StdDuration) {
    info!("Starting background task to close expired polls every {:?}", every);
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        let now = Utc::now();
        debug!("Checking for expired polls at {}", now.to_rfc3339());

        let closed = engine.close_expired(now);
        if !closed.is_empty() {
            info!("Closed {} expired poll(s).", closed.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PollDefinition, PollKind, PollOption, PollState};
    use chrono::Duration;

    #[tokio::test]
    async fn sweeper_closes_overdue_polls() {
        let engine = Arc::new(Engine::new());
        let now = Utc::now();
        let poll = engine
            .create_poll(PollDefinition {
                title: "Pintura".to_string(),
                description: String::new(),
                kind: PollKind::SingleChoice,
                options: vec![PollOption::new("sim", "Sim"), PollOption::new("nao", "Não")],
                opens_at: now - Duration::days(2),
                closes_at: now - Duration::days(1),
                quorum_required_pct: 0,
                eligible_voter_count: 10,
                affirmative_option_id: None,
                created_by: None,
                attachments: Vec::new(),
            })
            .unwrap();
        engine.publish(&poll.id).unwrap();

        let task = tokio::spawn(check_expired_polls_task(
            Arc::clone(&engine),
            StdDuration::from_millis(10),
        ));

        // The first tick fires immediately.
        for _ in 0..50 {
            if engine.get_poll(&poll.id).unwrap().state == PollState::Closed {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(engine.get_poll(&poll.id).unwrap().state, PollState::Closed);
    }
}
