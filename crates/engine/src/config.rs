use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub min_room_width: f64,
    pub min_room_height: f64,
    pub gap: f64,
    /// Horizontal padding on each side of the canvas.
    pub padding: f64,
    pub max_columns: usize,
    pub room_header: f64,
    pub room_inner_pad: f64,
    pub desk_slot_width: f64,
    pub desk_slot_height: f64,
    pub leadership_height: f64,
    pub break_room_height: f64,
    pub meeting_seats: usize,
    pub pick_radius: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_room_width: 260.0,
            min_room_height: 170.0,
            gap: 20.0,
            padding: 24.0,
            max_columns: 3,
            room_header: 34.0,
            room_inner_pad: 14.0,
            desk_slot_width: 76.0,
            desk_slot_height: 70.0,
            leadership_height: 150.0,
            break_room_height: 130.0,
            meeting_seats: 6,
            pick_radius: 22.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub avatar_speed: f64,
    pub avatar_radius: f64,
    pub working_particle_every: u64,
    pub sweat_every: u64,
    pub stressed_sweat_every: u64,
    pub sleep_every: u64,
    pub clock_every: u64,
    pub steam_every: u64,
    pub sway_every: u64,
    pub max_particles: usize,
    pub particle_seed: u64,
    /// Offset from UTC applied to the wall clocks.
    pub clock_utc_offset_minutes: i64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            avatar_speed: 3.0,
            avatar_radius: 10.0,
            working_particle_every: 12,
            sweat_every: 45,
            stressed_sweat_every: 24,
            sleep_every: 60,
            clock_every: 30,
            steam_every: 20,
            sway_every: 4,
            max_particles: 400,
            particle_seed: 0x00B0_5E55,
            clock_utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub arc_speed: f64,
    pub walk_speed: f64,
    pub meeting_walk_speed: f64,
    pub arc_height: f64,
    pub walk_bob: f64,
    pub default_hold_ms: i64,
    pub bubble_ttl_ms: i64,
    pub inbox_capacity: usize,
    /// Undrained notifications kept for collaborators; oldest are dropped first.
    pub notification_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            arc_speed: 0.02,
            walk_speed: 0.006,
            meeting_walk_speed: 0.01,
            arc_height: 60.0,
            walk_bob: 2.0,
            default_hold_ms: 10 * 60 * 1000,
            bubble_ttl_ms: 4_000,
            inbox_capacity: 256,
            notification_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub handoff_capacity: usize,
    pub collaboration_capacity: usize,
    pub meeting_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            handoff_capacity: 512,
            collaboration_capacity: 512,
            meeting_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub tick_interval_ms: u64,
    pub snapshot_poll_ms: u64,
    pub presence_poll_ms: u64,
    pub cli_usage_poll_ms: u64,
    pub coalesce_debounce_ms: i64,
    pub coalesce_poll_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            snapshot_poll_ms: 5_000,
            presence_poll_ms: 3_000,
            cli_usage_poll_ms: 30_000,
            coalesce_debounce_ms: 150,
            coalesce_poll_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub animation: AnimationConfig,
    pub delivery: DeliveryConfig,
    pub dedup: DedupConfig,
    pub poll: PollConfig,
    /// Sprite keys the client has atlases for; anything else renders as a glyph.
    pub sprites: Vec<String>,
    /// Optional file of extra sprite keys, one per line, loaded after startup.
    pub sprite_manifest: Option<PathBuf>,
    pub locale: String,
    pub canvas_width: f64,
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default().normalized());
        }
        let cfg: Self = serde_yaml::from_str(raw).context("parse engine config yaml")?;
        Ok(cfg.normalized())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read engine config: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("load {}", path.display()))
    }

    pub fn normalized(mut self) -> Self {
        if self.locale.trim().is_empty() {
            self.locale = "en".to_string();
        }
        if !(self.canvas_width.is_finite() && self.canvas_width > 0.0) {
            self.canvas_width = 1200.0;
        }
        self.layout.max_columns = self.layout.max_columns.clamp(1, 3);
        self.layout.meeting_seats = self.layout.meeting_seats.max(1);
        self.animation.working_particle_every = self.animation.working_particle_every.max(1);
        self.animation.sweat_every = self.animation.sweat_every.max(1);
        self.animation.stressed_sweat_every = self.animation.stressed_sweat_every.max(1);
        self.animation.sleep_every = self.animation.sleep_every.max(1);
        self.animation.clock_every = self.animation.clock_every.max(1);
        self.animation.steam_every = self.animation.steam_every.max(1);
        self.animation.sway_every = self.animation.sway_every.max(1);
        self
    }
}
