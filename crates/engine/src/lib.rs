//! Scene engine for the Bureau live office view.
//!
//! Layout, per-frame animation and event/presence reconciliation live here,
//! with no IO: callers pass `now_ms` into every time-dependent operation.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod decision;
pub mod dedup;
pub mod delivery;
pub mod geometry;
pub mod input;
pub mod layout;
pub mod particles;
pub mod presence;
pub mod refresh;
pub mod registry;
pub mod resources;
pub mod scene;
pub mod scheduler;
pub mod sprites;
pub mod stress;

pub use config::EngineConfig;
pub use delivery::{DeliveryActor, DeliveryManager, IngestOutcome};
pub use geometry::{Point, Rect};
pub use layout::{build_layout, LayoutInput, OfficeLayout};
pub use refresh::RefreshCoalescer;
pub use scene::OfficeScene;
pub use scheduler::{InitTicket, Lifecycle, Scheduler};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// Platform-independent hash of an id, used wherever placement must not
/// change between runs or builds.
pub fn stable_hash(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash("agent-1"), stable_hash("agent-1"));
        assert_ne!(stable_hash("agent-1"), stable_hash("agent-2"));
    }
}
