//! Polling loop that keeps one `UserState` caught up with the provider.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::provider::RollupProvider;
use crate::user_state::{ProcessReport, UserState};

pub struct SyncDriver {
    state: UserState,
    provider: Arc<dyn RollupProvider>,
    options: SyncOptions,
    blocks_since_flush: usize,
}

impl SyncDriver {
    pub fn new(state: UserState, provider: Arc<dyn RollupProvider>, options: SyncOptions) -> Self {
        Self {
            state,
            provider,
            options,
            blocks_since_flush: 0,
        }
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut UserState {
        &mut self.state
    }

    /// Fetch and apply the next run of blocks, flushing on cadence.
    ///
    /// Blocks are only fetched while the provider reports a newer rollup than
    /// the cursor.
    pub async fn sync_once(&mut self) -> Result<ProcessReport> {
        let from = self.state.get_user_data().synced_to_rollup.map_or(0, |c| c + 1);
        let latest = self.provider.get_latest_rollup_id().await?;
        let blocks = match latest {
            Some(latest) if latest >= from => self.provider.get_blocks(from, self.options.max_blocks_per_pass).await?,
            _ => Vec::new(),
        };

        let report = if blocks.is_empty() {
            ProcessReport {
                synced_to_rollup: self.state.get_user_data().synced_to_rollup,
                ..ProcessReport::default()
            }
        } else {
            self.state.process_blocks(&blocks).await?
        };
        self.blocks_since_flush += report.blocks;

        if self.blocks_since_flush >= self.options.flush_every {
            self.state.flush().await?;
            self.blocks_since_flush = 0;
        }
        Ok(report)
    }

    /// Run until `cancel` fires. A pass in flight always completes first.
    ///
    /// Provider and database errors are retried after `poll_interval`; bad
    /// block data stops the loop.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<UserState> {
        let user = *self.state.account_public_key();
        info!(user = %user, "sync driver: started");

        while !cancel.is_cancelled() {
            let idle = match self.sync_once().await {
                Ok(report) => {
                    if report.blocks > 0 {
                        info!(
                            user = %user,
                            blocks = report.blocks,
                            synced_to_rollup = ?report.synced_to_rollup,
                            notes_added = report.notes_added,
                            "sync driver: applied blocks"
                        );
                    }
                    report.blocks == 0
                }
                Err(e @ (SyncError::MalformedBlock { .. } | SyncError::NonContiguousBlocks { .. } | SyncError::ShutDown)) => {
                    warn!(user = %user, error = %e, "sync driver: stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "sync driver: pass failed, retrying");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.options.poll_interval) => {}
                }
            }
        }

        let receipt = self.state.shutdown(self.options.flush_on_shutdown).await?;
        info!(user = %user, flushed_ops = receipt.map_or(0, |r| r.ops), "sync driver: stopped");
        Ok(self.state)
    }
}
