use chrono::Duration;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_CLOSING_SOON_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sweep_interval: StdDuration,
    pub closing_soon_window: Duration,
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            closing_soon_window: Duration::hours(DEFAULT_CLOSING_SOON_HOURS),
            seed_file: None,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first if a
    /// `.env` file should be honoured.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let sweep_interval = parse_setting(&lookup, "SWEEP_INTERVAL_SECONDS", |secs: u64| {
            (secs > 0).then(|| StdDuration::from_secs(secs))
        })
        .unwrap_or(defaults.sweep_interval);

        // try_hours returns None past chrono's range instead of panicking.
        let closing_soon_window = parse_setting(&lookup, "CLOSING_SOON_HOURS", |hours: i64| {
            (hours > 0).then(|| Duration::try_hours(hours)).flatten()
        })
        .unwrap_or(defaults.closing_soon_window);

        let seed_file = lookup("SEED_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Self {
            sweep_interval,
            closing_soon_window,
            seed_file,
        }
    }
}

// Unset gives None quietly; values that don't parse or convert give None
// with a warning.
fn parse_setting<T: std::str::FromStr, U>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    convert: impl FnOnce(T) -> Option<U>,
) -> Option<U> {
    let raw = lookup(key)?;
    let value = raw.trim().parse::<T>().ok().and_then(convert);
    if value.is_none() {
        warn!("Ignoring invalid {}={:?}, using default", key, raw);
    }
    value
}
