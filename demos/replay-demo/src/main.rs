//! Replay demo: sync one account against a scripted chain into a file-backed
//! store, then print what the account can see.
//!
//! Settings come from the environment (a `.env` file works too):
//! `REPLAY_STATE_PATH`, `REPLAY_PADDING_BLOCKS`, `REPLAY_RUN_FOR_MS` and the
//! `ROLLUP_SYNC_*` driver options. Logging follows `RUST_LOG`.

mod chain;
mod config;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use kvstore::{FileBackedStorage, KvStore};
use rollup_sync::{CoreUserTx, Database, KvDatabase, StandardNoteCrypto, SyncDriver, UserData, UserState};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chain::{ChainBuilder, SeededWorldState};
use crate::config::AppConfig;

#[derive(Serialize)]
struct Summary {
    account: String,
    synced_to_rollup: Option<u64>,
    spendable_notes: usize,
    balances: BTreeMap<u32, u128>,
    txs: usize,
    defi: Vec<String>,
    commits: u64,
    commit_log_verified: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let crypto = Arc::new(StandardNoteCrypto::new());
    let (user_key, user) = crypto.generate_account(&mut rand::thread_rng());
    let (_, counterparty) = crypto.generate_account(&mut rand::thread_rng());

    let mut chain = ChainBuilder::new(crypto.clone(), user, user_key.clone());
    chain.script(counterparty, cfg.padding_blocks)?;
    let provider = Arc::new(chain.into_provider());

    let storage = FileBackedStorage::open(&cfg.state_path)
        .with_context(|| format!("Failed to open state file {}", cfg.state_path.display()))?;
    let db = Arc::new(KvDatabase::new(KvStore::new(storage)));

    let mut state = UserState::new(
        UserData::new(user),
        user_key,
        crypto,
        db.clone(),
        Arc::new(SeededWorldState),
        provider.clone(),
    );
    let orphans = state.init().await?;
    info!(
        account = %user,
        removed_txs = orphans.removed_txs.len(),
        removed_notes = orphans.removed_notes.len(),
        "replay: user state ready"
    );

    let cancel = CancellationToken::new();
    let driver = SyncDriver::new(state, provider, cfg.sync.clone());
    let handle = tokio::spawn(driver.run(cancel.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("replay: interrupted"),
        _ = tokio::time::sleep(cfg.run_for) => {}
    }
    cancel.cancel();
    let state = handle.await.context("sync driver task panicked")??;

    let notes = db.get_notes(&user).await?;
    let mut balances = BTreeMap::new();
    for note in notes.iter().filter(|n| n.is_spendable()) {
        *balances.entry(note.asset_id()).or_insert(0u128) += note.value();
    }
    let txs = db.get_user_txs(&user).await?;
    let defi = txs
        .iter()
        .filter_map(|tx| match tx {
            CoreUserTx::Defi(tx) => Some(format!("{}: {:?}", tx.tx_id, tx.state())),
            _ => None,
        })
        .collect();

    let summary = Summary {
        account: user.to_string(),
        synced_to_rollup: state.get_user_data().synced_to_rollup,
        spendable_notes: notes.iter().filter(|n| n.is_spendable()).count(),
        balances,
        txs: txs.len(),
        defi,
        commits: db.checkpoint().await.commits,
        commit_log_verified: db.verify_commit_log().await,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
