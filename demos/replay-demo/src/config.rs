use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rollup_sync::SyncOptions;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub state_path: PathBuf,
    /// Empty blocks appended after the scripted ones.
    pub padding_blocks: u64,
    pub run_for: Duration,
    pub sync: SyncOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let state_path = std::env::var("REPLAY_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("replay-demo/user-state.bin"));
        let padding_blocks = parse("REPLAY_PADDING_BLOCKS", 4)?;
        let run_for = Duration::from_millis(parse("REPLAY_RUN_FOR_MS", 1_500)?);
        let sync = SyncOptions::from_env().context("Invalid ROLLUP_SYNC_* settings")?;

        if run_for.is_zero() {
            bail!("REPLAY_RUN_FOR_MS must be greater than zero");
        }
        if run_for <= sync.poll_interval {
            bail!("REPLAY_RUN_FOR_MS must exceed ROLLUP_SYNC_POLL_INTERVAL_MS or the driver never polls twice");
        }

        Ok(Self {
            state_path,
            padding_blocks,
            run_for,
            sync,
        })
    }
}

fn parse(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("Invalid number in env var: {key}")),
        Err(_) => Ok(default),
    }
}
