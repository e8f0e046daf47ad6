//! The owned simulation state of one mounted office view.
//!
//! Everything the tick and the event handlers touch lives on [`OfficeScene`]:
//! layout, persistent agent actors, delivery actors, the avatar, particles
//! and the resource arena backing all of them. Hosts serialise access (the
//! server keeps it behind a mutex) and call in with `now_ms`.

use std::collections::{BTreeMap, VecDeque};

use bureau_protocol::{
    AmbientView, CeoOfficeCall, CliUsage, ClockView, CrossDeptDelivery, DepartmentTheme,
    DeskView, FurnitureView, HelperView, InputCommand, MeetingPresenceRow, OfficeSnapshot,
    ParticleKind, Pose, PushEvent, RoomView, SceneFrame, SceneNotification, SceneSettings,
    StressLevel, ZoneView,
};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::delivery::{DeliveryManager, Handoff, IngestOutcome, Stage};
use crate::geometry::Point;
use crate::input::{InputController, PadEffect};
use crate::layout::{build_layout, FurnitureKind, LayoutInput, OfficeLayout, Zone};
use crate::particles::ParticleField;
use crate::presence::{reconcile, ReconcileReport};
use crate::registry::ActorRegistry;
use crate::resources::{NodeHandle, ResourceArena, ResourceKind, SceneGraph};
use crate::scheduler::{InitGuard, InitTicket, Lifecycle, Scheduler};
use crate::sprites::SpriteCatalog;

#[derive(Debug, Clone)]
enum InboxItem {
    Handoff(Handoff),
    Collaboration(CrossDeptDelivery),
    Meeting(CeoOfficeCall),
}

impl InboxItem {
    fn id(&self) -> &str {
        match self {
            Self::Handoff(h) => &h.id,
            Self::Collaboration(c) => &c.id,
            Self::Meeting(m) => &m.id,
        }
    }
}

/// Owned copy of [`Zone`] so the highlight survives a layout swap.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Highlight {
    Department(String),
    Leadership,
    BreakRoom,
}

impl From<Zone<'_>> for Highlight {
    fn from(zone: Zone<'_>) -> Self {
        match zone {
            Zone::Department(id) => Self::Department(id.to_string()),
            Zone::Leadership => Self::Leadership,
            Zone::BreakRoom => Self::BreakRoom,
        }
    }
}

fn stage<'a>(layout: &'a OfficeLayout, registry: &'a ActorRegistry) -> Stage<'a> {
    Stage {
        anchors: registry,
        seats: &layout.seats,
        handoff_origin: layout.handoff_origin,
    }
}

#[derive(Debug)]
pub struct OfficeScene {
    cfg: EngineConfig,
    snapshot: OfficeSnapshot,
    seen_snapshot: bool,
    tasks_by_agent: BTreeMap<String, String>,
    locale: String,
    theme_overrides: BTreeMap<String, DepartmentTheme>,
    canvas_width: f64,

    layout: OfficeLayout,
    registry: ActorRegistry,
    deliveries: DeliveryManager,
    input: InputController,
    particles: ParticleField,
    scheduler: Scheduler,
    init: InitGuard,

    arena: ResourceArena,
    graph: SceneGraph,
    atlas: Option<NodeHandle>,
    sprites: SpriteCatalog,

    usage: CliUsage,
    presence: Vec<MeetingPresenceRow>,
    inbox: VecDeque<InboxItem>,
    outbox: VecDeque<SceneNotification>,

    highlight: Option<Highlight>,
    clock: ClockView,
    ambient: AmbientView,
    rebuilds: u64,
}

impl OfficeScene {
    pub fn new(cfg: EngineConfig) -> Self {
        let cfg = cfg.normalized();
        let snapshot = OfficeSnapshot::default();
        let locale = cfg.locale.clone();
        let canvas_width = cfg.canvas_width;
        let theme_overrides = BTreeMap::new();
        let layout = build_layout(
            &LayoutInput {
                snapshot: &snapshot,
                canvas_width,
                locale: &locale,
                theme_overrides: &theme_overrides,
            },
            &cfg.layout,
        );
        let mut scene = Self {
            deliveries: DeliveryManager::new(cfg.delivery.clone(), &cfg.dedup),
            input: InputController::new(layout.leadership.center()),
            particles: ParticleField::new(cfg.animation.max_particles, cfg.animation.particle_seed),
            sprites: SpriteCatalog::new(cfg.sprites.iter().cloned()),
            snapshot,
            seen_snapshot: false,
            tasks_by_agent: BTreeMap::new(),
            locale,
            theme_overrides,
            canvas_width,
            layout,
            registry: ActorRegistry::default(),
            scheduler: Scheduler::default(),
            init: InitGuard::default(),
            arena: ResourceArena::new(),
            graph: SceneGraph::default(),
            atlas: None,
            usage: CliUsage::default(),
            presence: Vec::new(),
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            highlight: None,
            clock: ClockView::default(),
            ambient: AmbientView::default(),
            rebuilds: 0,
            cfg,
        };
        scene.rebuild(0);
        scene
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn layout(&self) -> &OfficeLayout {
        &self.layout
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn deliveries(&self) -> &DeliveryManager {
        &self.deliveries
    }

    pub fn arena(&self) -> &ResourceArena {
        &self.arena
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn particles(&self) -> &ParticleField {
        &self.particles
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.scheduler.lifecycle()
    }

    pub fn tick_count(&self) -> u64 {
        self.scheduler.tick()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn torn_down(&self) -> bool {
        self.scheduler.lifecycle() == Lifecycle::Stopped
    }

    // -- lifecycle ---------------------------------------------------------

    pub fn start(&mut self) -> bool {
        self.scheduler.start()
    }

    pub fn pause(&mut self) -> bool {
        let paused = self.scheduler.pause();
        if paused {
            self.input.release_all();
        }
        paused
    }

    pub fn resume(&mut self) -> bool {
        self.scheduler.resume()
    }

    /// Visibility observer hook: hidden pauses, visible resumes.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        if visible {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Release every resource and stop for good. Safe to call twice.
    pub fn unmount(&mut self) {
        if self.torn_down() {
            return;
        }
        self.scheduler.stop();
        self.init.invalidate();
        self.deliveries.release_all(&mut self.arena);
        self.graph.clear(&mut self.arena);
        if let Some(atlas) = self.atlas.take() {
            self.arena.release(atlas);
        }
        let leftover = self.arena.release_all();
        if leftover > 0 {
            warn!(leftover, "unmount released untracked resources");
        }
        self.particles.clear();
        self.inbox.clear();
        self.input.release_all();
        info!(released = self.arena.released_total(), "scene unmounted");
    }

    /// Ticket for an async initialisation step (sprite manifest load).
    pub fn begin_init(&self) -> InitTicket {
        self.init.begin()
    }

    /// Apply a loaded sprite manifest. Stale tickets are discarded.
    pub fn complete_sprite_load<I, S>(&mut self, ticket: InitTicket, keys: I, now_ms: i64) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.torn_down() || !self.init.is_current(ticket) {
            debug!("stale sprite load discarded");
            return false;
        }
        self.sprites.replace(keys);
        debug!(sprites = self.sprites.len(), "sprite manifest applied");
        self.rebuild(now_ms);
        true
    }

    // -- domain inputs -----------------------------------------------------

    /// Replace the domain snapshot. Task reassignments since the previous
    /// snapshot become handoffs; the first snapshot of a session yields none.
    pub fn apply_snapshot(&mut self, snapshot: OfficeSnapshot, now_ms: i64) {
        if self.torn_down() {
            return;
        }
        let mut next_tasks = BTreeMap::new();
        for agent in &snapshot.agents {
            let Some(task) = agent.current_task_id.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            if self.seen_snapshot && self.tasks_by_agent.get(&agent.id).map(String::as_str) != Some(task) {
                self.push_inbox(InboxItem::Handoff(Handoff::new(&agent.id, task)));
            }
            next_tasks.insert(agent.id.clone(), task.to_string());
        }
        self.tasks_by_agent = next_tasks;
        self.seen_snapshot = true;
        self.snapshot = snapshot;
        self.rebuild(now_ms);
    }

    pub fn set_locale(&mut self, locale: &str, now_ms: i64) {
        let locale = locale.trim();
        if locale.is_empty() || locale == self.locale {
            return;
        }
        self.locale = locale.to_string();
        self.rebuild(now_ms);
    }

    pub fn set_theme_overrides(&mut self, overrides: BTreeMap<String, DepartmentTheme>, now_ms: i64) {
        if overrides == self.theme_overrides {
            return;
        }
        self.theme_overrides = overrides;
        self.rebuild(now_ms);
    }

    pub fn apply_settings(&mut self, settings: SceneSettings, now_ms: i64) {
        if let Some(locale) = settings.locale.as_deref() {
            self.set_locale(locale, now_ms);
        }
        if let Some(overrides) = settings.theme_overrides {
            self.set_theme_overrides(overrides, now_ms);
        }
    }

    pub fn set_canvas_width(&mut self, width: f64, now_ms: i64) {
        if !(width.is_finite() && width > 0.0) || (width - self.canvas_width).abs() < 0.5 {
            return;
        }
        self.canvas_width = width;
        self.rebuild(now_ms);
    }

    pub fn set_cli_usage(&mut self, usage: CliUsage) {
        self.usage = usage;
    }

    pub fn apply_presence(&mut self, rows: Vec<MeetingPresenceRow>, now_ms: i64) -> ReconcileReport {
        if self.torn_down() {
            return ReconcileReport::default();
        }
        self.presence = rows;
        self.drain_inbox(now_ms);
        self.reconcile_presence(now_ms)
    }

    fn reconcile_presence(&mut self, now_ms: i64) -> ReconcileReport {
        let stage = stage(&self.layout, &self.registry);
        reconcile(&mut self.deliveries, &self.presence, &stage, &mut self.arena, now_ms)
    }

    /// Full rebuild of static geometry. Delivery actors are detached for the
    /// duration and re-targeted afterwards; they are never recreated here.
    fn rebuild(&mut self, now_ms: i64) {
        if self.torn_down() {
            return;
        }
        self.deliveries.detach_all(&mut self.arena);

        let layout = build_layout(
            &LayoutInput {
                snapshot: &self.snapshot,
                canvas_width: self.canvas_width,
                locale: &self.locale,
                theme_overrides: &self.theme_overrides,
            },
            &self.cfg.layout,
        );
        let report = self.graph.sync(layout.node_keys(), &mut self.arena);
        if let Some(old) = self.atlas.take() {
            self.arena.release(old);
        }
        self.atlas = Some(self.arena.allocate(ResourceKind::Atlas));
        self.registry.rebuild(&layout, &self.snapshot, &self.sprites);
        self.layout = layout;

        self.deliveries.reattach_all(&mut self.arena);
        let stage = stage(&self.layout, &self.registry);
        self.deliveries.retarget(&stage);
        self.input.clamp_to(
            self.layout.width,
            self.layout.height,
            self.cfg.animation.avatar_radius,
        );
        self.rebuilds += 1;
        debug!(
            columns = self.layout.columns,
            rooms = self.layout.rooms.len(),
            anchors = self.layout.anchors.len(),
            created = report.created,
            kept = report.kept,
            released = report.released,
            "layout rebuilt"
        );

        self.drain_inbox(now_ms);
        self.reconcile_presence(now_ms);
    }

    // -- push events -------------------------------------------------------

    /// Queue a push event and run an ingestion pass. Returns true when the
    /// event asks for a domain snapshot refresh instead.
    pub fn enqueue_event(&mut self, event: PushEvent, now_ms: i64) -> bool {
        if self.torn_down() {
            return false;
        }
        let refresh = event.requests_refresh();
        match event {
            PushEvent::CrossDeptDelivery(ev) => self.push_inbox(InboxItem::Collaboration(ev)),
            PushEvent::CeoOfficeCall(call) => self.push_inbox(InboxItem::Meeting(call)),
            PushEvent::TaskUpdate(_) | PushEvent::AgentStatus(_) | PushEvent::SubtaskUpdate(_) => {}
        }
        self.drain_inbox(now_ms);
        refresh
    }

    fn push_inbox(&mut self, item: InboxItem) {
        if self.inbox.len() >= self.cfg.delivery.inbox_capacity.max(1) {
            if let Some(dropped) = self.inbox.pop_front() {
                warn!(id = dropped.id(), "event inbox full; dropping oldest");
            }
        }
        self.inbox.push_back(item);
    }

    /// One ingestion pass. Deferred events stay queued in arrival order.
    fn drain_inbox(&mut self, now_ms: i64) {
        if self.inbox.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.inbox);
        let capacity = self.cfg.delivery.notification_capacity;
        let stage = stage(&self.layout, &self.registry);
        for item in pending {
            let outcome = match &item {
                InboxItem::Handoff(h) => self.deliveries.ingest_handoff(h, &stage, &mut self.arena),
                InboxItem::Collaboration(c) => {
                    self.deliveries.ingest_collaboration(c, &stage, &mut self.arena)
                }
                InboxItem::Meeting(m) => {
                    self.deliveries
                        .ingest_meeting_call(m, &stage, &mut self.arena, now_ms)
                }
            };
            match outcome {
                IngestOutcome::Processed => match item {
                    InboxItem::Collaboration(c) => push_bounded(
                        &mut self.outbox,
                        capacity,
                        SceneNotification::CrossDeptDeliveryProcessed { id: c.id },
                    ),
                    InboxItem::Meeting(m) => push_bounded(
                        &mut self.outbox,
                        capacity,
                        SceneNotification::CeoOfficeCallProcessed { id: m.id },
                    ),
                    InboxItem::Handoff(_) => {}
                },
                IngestOutcome::Duplicate => {}
                IngestOutcome::Deferred => self.inbox.push_back(item),
            }
        }
    }

    fn push_outbox(&mut self, note: SceneNotification) {
        push_bounded(&mut self.outbox, self.cfg.delivery.notification_capacity, note);
    }

    pub fn drain_notifications(&mut self) -> Vec<SceneNotification> {
        self.outbox.drain(..).collect()
    }

    // -- input -------------------------------------------------------------

    pub fn handle_input(&mut self, cmd: InputCommand, now_ms: i64) {
        match cmd {
            InputCommand::KeyDown { direction } => self.input.key_down(direction),
            InputCommand::KeyUp { direction } => self.input.key_up(direction),
            InputCommand::PadPress { button } => {
                if self.input.pad_press(button) == PadEffect::Interact {
                    self.interact();
                }
            }
            InputCommand::PadRelease { button } => self.input.pad_release(button),
            InputCommand::Interact => self.interact(),
            InputCommand::Pick { x, y } => self.pick(Point::new(x, y)),
            InputCommand::Viewport { width, height } => self.input.set_viewport(width, height),
            InputCommand::CanvasWidth { width } => self.set_canvas_width(width, now_ms),
        }
    }

    fn interact(&mut self) {
        let note = match self.layout.zone_at(self.input.position()) {
            Some(Zone::Department(id)) => Some(SceneNotification::SelectDepartment {
                department_id: id.to_string(),
            }),
            Some(Zone::Leadership) => self
                .deliveries
                .held()
                .filter(|a| a.has_arrived())
                .find_map(|a| a.task_id.clone())
                .map(|task_id| SceneNotification::OpenMeetingMinutes { task_id }),
            Some(Zone::BreakRoom) | None => None,
        };
        if let Some(note) = note {
            debug!(event = note.event_name(), "interact");
            self.push_outbox(note);
        }
    }

    fn pick(&mut self, p: Point) {
        if let Some(actor) = self.registry.nearest(p, self.cfg.layout.pick_radius) {
            self.push_outbox(SceneNotification::SelectAgent {
                agent_id: actor.agent_id.clone(),
            });
        }
    }

    // -- frame -------------------------------------------------------------

    /// Advance one frame. Returns false when the scheduler is not running.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let Some(tick) = self.scheduler.begin_frame() else {
            return false;
        };
        let anim = &self.cfg.animation;

        let avatar = self.input.step(
            anim.avatar_speed,
            self.layout.width,
            self.layout.height,
            anim.avatar_radius,
        );
        self.highlight = self.layout.zone_at(avatar).map(Highlight::from);

        self.registry.advance(tick, &self.usage);
        for actor in self.registry.iter() {
            let phase = actor.phase;
            let head = actor.position.offset(0.0, -18.0);
            if actor.desk_bound()
                && actor.pose == Pose::Working
                && self.scheduler.every_with_phase(anim.working_particle_every, phase)
            {
                self.particles.spawn(ParticleKind::Spark, head);
            }
            let (period, kind) = match actor.stress {
                StressLevel::Normal => continue,
                StressLevel::Sweat => (anim.sweat_every, ParticleKind::Sweat),
                StressLevel::Stressed => (anim.stressed_sweat_every, ParticleKind::Sweat),
                StressLevel::Collapsed => (anim.sleep_every, ParticleKind::Sleep),
            };
            if self.scheduler.every_with_phase(period, phase) {
                self.particles.spawn(kind, head);
            }
        }

        self.deliveries.advance(&mut self.arena, now_ms);
        self.particles.advance();

        let coffee = self
            .layout
            .furniture
            .iter()
            .find(|f| f.kind == FurnitureKind::CoffeeMachine)
            .map(|f| f.point);
        self.ambient.steam_on = coffee.is_some();
        if let Some(at) = coffee {
            if self.scheduler.every(anim.steam_every) {
                self.particles.spawn(ParticleKind::Steam, at.offset(0.0, -14.0));
            }
        }
        if self.scheduler.every(anim.sway_every) {
            self.ambient.sway = (tick as f64 * 0.05).sin() * 3.0;
        }
        if tick == 1 || self.scheduler.every(anim.clock_every) {
            self.clock = clock_at(now_ms, anim.clock_utc_offset_minutes);
        }
        true
    }

    pub fn frame(&self) -> SceneFrame {
        let highlighted_room = match &self.highlight {
            Some(Highlight::Department(id)) => Some(id.as_str()),
            _ => None,
        };
        let layout = &self.layout;
        SceneFrame {
            tick: self.scheduler.tick(),
            width: layout.width,
            height: layout.height,
            columns: layout.columns,
            locale: self.locale.clone(),
            rooms: layout
                .rooms
                .iter()
                .map(|r| RoomView {
                    department_id: r.department_id.clone(),
                    label: r.label.clone(),
                    icon: r.icon.clone(),
                    rect: r.rect.view(),
                    theme: r.theme.clone(),
                    highlighted: highlighted_room == Some(r.department_id.as_str()),
                    empty: r.empty,
                })
                .collect(),
            zones: vec![
                ZoneView {
                    kind: "leadership".into(),
                    rect: layout.leadership.view(),
                    highlighted: self.highlight == Some(Highlight::Leadership),
                },
                ZoneView {
                    kind: "break".into(),
                    rect: layout.break_room.view(),
                    highlighted: self.highlight == Some(Highlight::BreakRoom),
                },
            ],
            desks: layout
                .desks
                .iter()
                .map(|d| DeskView {
                    agent_id: d.agent_id.clone(),
                    rect: d.rect.view(),
                })
                .collect(),
            seats: layout.seats.iter().map(|s| s.view()).collect(),
            furniture: layout
                .furniture
                .iter()
                .map(|f| FurnitureView {
                    kind: f.kind.as_str().to_string(),
                    position: f.point.view(),
                })
                .collect(),
            agents: self.registry.iter().map(|a| a.view()).collect(),
            helpers: layout
                .helpers
                .iter()
                .map(|h| HelperView {
                    id: h.id.clone(),
                    parent_agent_id: h.parent_agent_id.clone(),
                    position: h.point.view(),
                    working: h.working,
                })
                .collect(),
            deliveries: self
                .deliveries
                .actors()
                .map(|a| a.view(&self.sprites))
                .collect(),
            particles: self.particles.views(),
            bubbles: self.deliveries.bubble_views(),
            clock: self.clock,
            ambient: self.ambient,
            avatar: self.input.position().view(),
            camera: self.input.camera(layout.width, layout.height).view(),
        }
    }
}

/// Clock hand angles in degrees, clockwise from twelve.
/// Outbox append that drops the oldest notification once `capacity` is reached.
fn push_bounded(outbox: &mut VecDeque<SceneNotification>, capacity: usize, note: SceneNotification) {
    if outbox.len() >= capacity.max(1) {
        if let Some(dropped) = outbox.pop_front() {
            warn!(event = dropped.event_name(), "notification outbox full; dropping oldest");
        }
    }
    outbox.push_back(note);
}

fn clock_at(now_ms: i64, utc_offset_minutes: i64) -> ClockView {
    let offset = i32::try_from(utc_offset_minutes.saturating_mul(60))
        .ok()
        .and_then(|s| UtcOffset::from_whole_seconds(s).ok())
        .unwrap_or(UtcOffset::UTC);
    let Ok(at) = OffsetDateTime::from_unix_timestamp_nanos(i128::from(now_ms) * 1_000_000) else {
        return ClockView::default();
    };
    let at = at.to_offset(offset);
    let (h, m, s) = (at.hour() as f64, at.minute() as f64, at.second() as f64);
    ClockView {
        hour_angle: ((h % 12.0) + m / 60.0) * 30.0,
        minute_angle: (m + s / 60.0) * 6.0,
    }
}
