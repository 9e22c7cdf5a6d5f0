use chrono::Utc;
use condo_vote::config::Config;
use condo_vote::{seed, tasks, Engine, PollState};
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let engine = Arc::new(Engine::new());

    if let Some(path) = &config.seed_file {
        let seeded = seed::load(path).and_then(|file| seed::replay(&engine, file));
        match seeded {
            Ok(ids) => {
                for poll_id in ids {
                    match engine.minutes(&poll_id, Utc::now()) {
                        Ok(text) => println!("{}", text),
                        Err(e) => error!("Failed to render minutes for {}: {}", poll_id, e),
                    }
                }
            }
            Err(e) => {
                error!("Failed to load seed file {}: {}", path.display(), e);
                return;
            }
        }
    }

    let now = Utc::now();
    for poll in engine.closing_soon(now, config.closing_soon_window) {
        warn!("Poll '{}' closes at {}", poll.title, poll.closes_at.to_rfc3339());
    }

    let dashboard = engine.dashboard();
    info!(
        "{} open, {} closed, {} draft poll(s)",
        dashboard.open, dashboard.closed, dashboard.draft
    );

    // --- Start Background Task for Ending Polls ---
    let sweeper = tokio::spawn(tasks::poll_ender::check_expired_polls_task(
        Arc::clone(&engine),
        config.sweep_interval,
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    sweeper.abort();

    let still_open = engine.list_polls(Some(PollState::Open)).len();
    info!("Shutting down with {} poll(s) still open", still_open);
}
