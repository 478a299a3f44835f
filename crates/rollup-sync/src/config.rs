use std::time::Duration;

use crate::error::{Result, SyncError};

/// Knobs for the polling driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Flush after this many processed blocks.
    pub flush_every: usize,
    pub poll_interval: Duration,
    /// Upper bound on blocks requested per provider call.
    pub max_blocks_per_pass: usize,
    /// Flush on cancellation before returning.
    pub flush_on_shutdown: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            flush_every: 10,
            poll_interval: Duration::from_millis(1_000),
            max_blocks_per_pass: 32,
            flush_on_shutdown: true,
        }
    }
}

impl SyncOptions {
    /// Read `ROLLUP_SYNC_*` overrides on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let flush_every = parse_var("ROLLUP_SYNC_FLUSH_EVERY")?.unwrap_or(defaults.flush_every);
        let poll_interval = parse_var::<u64>("ROLLUP_SYNC_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let max_blocks_per_pass = parse_var("ROLLUP_SYNC_MAX_BLOCKS_PER_PASS")?.unwrap_or(defaults.max_blocks_per_pass);
        let flush_on_shutdown = std::env::var("ROLLUP_SYNC_FLUSH_ON_SHUTDOWN")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(defaults.flush_on_shutdown);

        let options = Self {
            flush_every,
            poll_interval,
            max_blocks_per_pass,
            flush_on_shutdown,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_every == 0 {
            return Err(SyncError::Config("ROLLUP_SYNC_FLUSH_EVERY must be at least 1".into()));
        }
        if self.max_blocks_per_pass == 0 {
            return Err(SyncError::Config("ROLLUP_SYNC_MAX_BLOCKS_PER_PASS must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::Config(format!("{key} is not a valid number: {raw}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SyncOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_flush_cadence_is_rejected() {
        let options = SyncOptions { flush_every: 0, ..SyncOptions::default() };
        assert!(matches!(options.validate(), Err(SyncError::Config(_))));
    }
}
