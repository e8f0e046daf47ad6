//! Background tasks that drive the scene: the frame tick and the pollers
//! that pull authoritative inputs out of the store.

use anyhow::Context;
use bureau_engine::now_ms;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::AppState;

/// Apply the stored snapshot if it is newer than what the scene has seen.
pub fn sync_snapshot(state: &AppState) -> anyhow::Result<bool> {
    let Some(stamped) = state.store.latest_snapshot()? else {
        return Ok(false);
    };
    if stamped.rev <= state.revs.snapshot.load(Ordering::Acquire) {
        return Ok(false);
    }
    state.scene().apply_snapshot(stamped.value, now_ms());
    state.revs.snapshot.store(stamped.rev, Ordering::Release);
    debug!(rev = stamped.rev, "snapshot applied");
    Ok(true)
}

pub fn sync_presence(state: &AppState) -> anyhow::Result<bool> {
    let Some(stamped) = state.store.latest_presence()? else {
        return Ok(false);
    };
    if stamped.rev <= state.revs.presence.load(Ordering::Acquire) {
        return Ok(false);
    }
    let report = state.scene().apply_presence(stamped.value, now_ms());
    state.revs.presence.store(stamped.rev, Ordering::Release);
    debug!(
        rev = stamped.rev,
        created = report.created,
        updated = report.updated,
        removed = report.removed,
        "presence applied"
    );
    Ok(true)
}

pub fn sync_cli_usage(state: &AppState) -> anyhow::Result<bool> {
    let Some(stamped) = state.store.latest_cli_usage()? else {
        return Ok(false);
    };
    if stamped.rev <= state.revs.cli_usage.load(Ordering::Acquire) {
        return Ok(false);
    }
    state.scene().set_cli_usage(stamped.value);
    state.revs.cli_usage.store(stamped.rev, Ordering::Release);
    Ok(true)
}

pub struct Runtime {
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn spawn(state: Arc<AppState>) -> Self {
        let poll = state.config.poll.clone();
        let tasks = vec![
            tokio::spawn(tick_loop(state.clone(), poll.tick_interval_ms)),
            tokio::spawn(snapshot_loop(state.clone())),
            tokio::spawn(poll_loop(
                state.clone(),
                poll.presence_poll_ms,
                sync_presence,
                "presence",
            )),
            tokio::spawn(poll_loop(
                state.clone(),
                poll.cli_usage_poll_ms,
                sync_cli_usage,
                "cli usage",
            )),
            tokio::spawn(load_sprite_manifest(state)),
        ];
        Self { tasks }
    }

    /// Stop every task, then tear the scene down.
    pub async fn shutdown(self, state: &AppState) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
        state.scene().unmount();
        info!("runtime stopped");
    }
}

async fn tick_loop(state: Arc<AppState>, period_ms: u64) {
    let mut ticker = interval(Duration::from_millis(period_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        state.scene().tick(now_ms());
    }
}

/// Periodic snapshot refresh plus coalesced refreshes requested by push events.
async fn snapshot_loop(state: Arc<AppState>) {
    let poll = state.config.poll.clone();
    let mut ticker = interval(Duration::from_millis(poll.coalesce_poll_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_periodic = 0_i64;
    loop {
        ticker.tick().await;
        if !state.is_running() {
            continue;
        }
        let now = now_ms();
        let coalesced = state.coalescer().poll(now);
        let periodic = now - last_periodic >= poll.snapshot_poll_ms as i64;
        if !coalesced && !periodic {
            continue;
        }
        if periodic {
            last_periodic = now;
        }
        if let Err(e) = sync_snapshot(&state) {
            warn!(error = %e, "snapshot sync failed");
        }
        if coalesced {
            state.coalescer().complete(now_ms());
        }
    }
}

async fn poll_loop(
    state: Arc<AppState>,
    period_ms: u64,
    sync: fn(&AppState) -> anyhow::Result<bool>,
    what: &'static str,
) {
    let mut ticker = interval(Duration::from_millis(period_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !state.is_running() {
            continue;
        }
        if let Err(e) = sync(&state) {
            warn!(error = %e, source = what, "sync failed");
        }
    }
}

pub fn parse_manifest(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

async fn read_manifest(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read sprite manifest: {}", path.display()))?;
    Ok(parse_manifest(&raw))
}

/// Load the sprite manifest off the request path. A completion that lands
/// after unmount is discarded by the scene's init ticket.
pub async fn load_sprite_manifest(state: Arc<AppState>) {
    let ticket = state.scene().begin_init();
    let mut keys = state.config.sprites.clone();
    if let Some(path) = state.config.sprite_manifest.as_deref() {
        match read_manifest(path).await {
            Ok(extra) => keys.extend(extra),
            Err(e) => warn!(error = %e, "sprite manifest unavailable; using glyphs"),
        }
    }
    keys.sort();
    keys.dedup();
    let count = keys.len();
    if state.scene().complete_sprite_load(ticket, keys, now_ms()) {
        info!(sprites = count, "sprite manifest loaded");
    }
}
