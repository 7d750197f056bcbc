//! Opens a Loro-backed block, types into it and logs the updates the
//! persistence bridge would dispatch.
//!
//! `RUST_LOG=blocktext_core=trace` shows every notification.

use std::rc::Rc;
use std::time::Duration;

use blocktext_core::{
    BlockId, BlockIdentity, BlockSession, BlockTree, BlockUpdate, Delta, EditOp, EditableTree,
    MemorySelectionStore, PersistenceBridge, SelectionStore, PersistenceError, ReplicatedTextStore, SyncConfig,
    TeardownPolicy, TextSelection, attributes,
};
use blocktext_crdt::{LoroBlockSession, LoroReplica};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Drive a block editing session and watch its debounced updates", long_about = None)]
struct Cli {
    /// Text typed at the end of the block, one keystroke per char
    #[arg(default_value = " world")]
    text: String,

    /// Persisted delta the block opens with (JSON)
    #[arg(long, default_value = r#"[{"insert":"hello"}]"#)]
    initial: String,

    /// Delay between keystrokes in milliseconds
    #[arg(long, default_value_t = 40)]
    keystroke_ms: u64,

    /// Debounce window in milliseconds
    #[arg(long, env = "BLOCKTEXT_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Send a pending update on close instead of dropping it
    #[arg(long)]
    flush: bool,
}

/// Stands in for the document store: logs the action it would dispatch.
struct LoggingBridge;

impl PersistenceBridge for LoggingBridge {
    async fn update_block(&self, update: BlockUpdate) -> Result<(), PersistenceError> {
        let action = serde_json::to_string(&update.to_action())
            .map_err(|e| PersistenceError::new(e.to_string()))?;
        info!(%action, "dispatching block update");
        Ok(())
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blocktext_core=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    LocalSet::new().run_until(run(cli)).await
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = SyncConfig::from_env();
    if let Some(ms) = cli.debounce_ms {
        config.debounce_ms = ms;
    }
    if cli.flush {
        config.teardown = TeardownPolicy::Flush;
    }
    let settle = config.debounce() + Duration::from_millis(50);

    let initial: Delta = cli.initial.parse()?;
    let mut identity = BlockIdentity::new("demo-block", "text").with_parent("demo-page");
    identity.splice_content(&config.content_key, &initial);

    let selections = Rc::new(MemorySelectionStore::new());
    let mut session: LoroBlockSession<LoggingBridge> = BlockSession::open(
        &config,
        identity,
        LoroReplica::new(),
        BlockTree::new(),
        Rc::new(LoggingBridge),
        Rc::clone(&selections),
    )?;

    let mut status = session.status();
    tokio::task::spawn_local(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!(status = ?current, "sync status");
        }
    });

    // Keystrokes inside one window collapse into a single update.
    for c in cli.text.chars() {
        let end = session.tree().len_chars();
        session.insert_text(end, &c.to_string())?;
        tokio::time::sleep(Duration::from_millis(cli.keystroke_ms)).await;
    }
    session.report_selection()?;
    tokio::time::sleep(settle).await;

    let first_word = session
        .tree()
        .plain_text()
        .split_whitespace()
        .next()
        .map(|w| w.chars().count())
        .unwrap_or(0);
    session.edit(&[EditOp::format(0..first_word, attributes([("bold", true)]))])?;
    tokio::time::sleep(settle).await;

    // A second replica of the same block edits and ships its changes over.
    let peer = LoroReplica::from_snapshot(&session.export_snapshot()?).into_diagnostic()?;
    let mut peer = ReplicatedTextStore::new(BlockId::new("demo-block"), peer);
    let since = peer.version();
    peer.mutate(&[EditOp::insert(0, "» ")])?;
    if let Some(update) = peer.export_updates_since(&since)? {
        session.merge_remote(&update)?;
    }
    info!(tree = %session.tree().content(), "after remote merge");
    tokio::time::sleep(settle).await;

    // The document store pushes its own version; nothing is echoed back.
    session.apply_external_delta(&Delta::new().insert("replaced by the store"))?;

    selections.set_selection(
        session.block_id(),
        Some(TextSelection::new(Some(0), Some(8))),
    );
    if let Some(selection) = session.sync_selection()? {
        info!(?selection, focused = session.tree().is_focused(), "applied stored selection");
    }

    // Closing mid-window drops or flushes this last edit.
    session.insert_text(0, "> ")?;
    session.close().await;
    info!(content = %session.content(), "session finished");
    Ok(())
}
