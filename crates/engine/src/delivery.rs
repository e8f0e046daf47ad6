//! Ephemeral actors for push events.
//!
//! Three event categories share one actor type and one advancement step:
//!
//! * handoffs arc from the leadership desk to an agent and vanish on arrival;
//! * collaboration walks go from one agent's anchor to another's, then vanish;
//! * meeting calls walk an agent to a seat and hold there until expiry or
//!   dismissal.
//!
//! Every category is deduplicated by event id before any other work. An event
//! whose anchors are not laid out yet is reported as
//! [`IngestOutcome::Deferred`] and left unmarked so a later pass can retry it.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use bureau_protocol::{
    BubbleView, CallAction, CeoOfficeCall, CrossDeptDelivery, DeliveryKind,
    DeliveryView, Facing, MeetingDecision, MotionKind,
};
use tracing::{debug, trace};

use crate::config::{DedupConfig, DeliveryConfig};
use crate::decision::{infer_decision, resolve_decision};
use crate::dedup::{EventCategory, ProcessedEvents};
use crate::geometry::{ease, lerp_point, Point};
use crate::registry::AnchorLookup;
use crate::resources::{NodeHandle, ResourceArena, ResourceKind};
use crate::sprites::SpriteCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed,
    Duplicate,
    Deferred,
}

/// A work item newly assigned to an agent, derived from snapshot diffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub id: String,
    pub agent_id: String,
    pub task_id: String,
}

impl Handoff {
    pub fn new(agent_id: &str, task_id: &str) -> Self {
        Self {
            id: format!("handoff:{agent_id}:{task_id}"),
            agent_id: agent_id.to_string(),
            task_id: task_id.to_string(),
        }
    }
}

/// Where an actor's destination comes from, so rebuilds can re-resolve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Agent(String),
    Seat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatHold {
    pub seat_index: usize,
    pub hold_until_ms: i64,
    pub arrived: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryActor {
    pub id: String,
    pub kind: DeliveryKind,
    pub agent_id: String,
    pub handle: NodeHandle,
    pub origin: Point,
    pub destination: Point,
    pub position: Point,
    pub progress: f64,
    pub speed: f64,
    pub motion: MotionKind,
    pub hold: Option<SeatHold>,
    pub decision: Option<MeetingDecision>,
    pub task_id: Option<String>,
    pub facing: Facing,
    pub alpha: f64,
    pub target: Target,
}

impl DeliveryActor {
    pub fn is_held(&self) -> bool {
        self.hold.is_some()
    }

    pub fn has_arrived(&self) -> bool {
        self.hold.is_some_and(|h| h.arrived)
    }

    pub fn view(&self, sprites: &SpriteCatalog) -> DeliveryView {
        let (sprite, glyph) = match self.kind {
            DeliveryKind::Handoff => ("delivery:document", "📄"),
            DeliveryKind::Collaboration => ("delivery:walker", "🚶"),
            DeliveryKind::Meeting => ("delivery:attendee", "🧑‍💼"),
        };
        DeliveryView {
            id: self.id.clone(),
            kind: self.kind,
            agent_id: self.agent_id.clone(),
            position: self.position.view(),
            alpha: self.alpha,
            facing: self.facing,
            arrived: self.has_arrived(),
            decision: self.decision,
            seat_index: self.hold.map(|h| h.seat_index),
            appearance: sprites.appearance(Some(sprite), glyph),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub position: Point,
    pub alpha: f64,
    pub facing: Facing,
}

const FADE_SPAN: f64 = 0.12;
const BOB_CYCLES: f64 = 6.0;

/// Position, opacity and orientation of a moving actor at `progress`.
pub fn sample_motion(
    origin: Point,
    destination: Point,
    progress: f64,
    motion: MotionKind,
    cfg: &DeliveryConfig,
) -> MotionSample {
    let p = progress.clamp(0.0, 1.0);
    let base = lerp_point(origin, destination, ease(p));
    let facing = if destination.x < origin.x {
        Facing::Left
    } else {
        Facing::Right
    };
    match motion {
        MotionKind::Walk => MotionSample {
            position: base.offset(0.0, -(p * PI * BOB_CYCLES * 2.0).sin().abs() * cfg.walk_bob),
            alpha: 1.0,
            facing,
        },
        MotionKind::Arc => MotionSample {
            position: base.offset(0.0, -(p * PI).sin() * cfg.arc_height),
            alpha: (p / FADE_SPAN).min((1.0 - p) / FADE_SPAN).clamp(0.0, 1.0),
            facing,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechBubble {
    pub agent_id: String,
    pub text: String,
    pub position: Point,
    pub until_ms: i64,
}

/// Read-only view of the laid-out scene that new actors are targeted against.
pub struct Stage<'a> {
    pub anchors: &'a dyn AnchorLookup,
    pub seats: &'a [Point],
    pub handoff_origin: Point,
}

impl Stage<'_> {
    pub fn seat(&self, seat_index: i64) -> Option<(usize, Point)> {
        let n = self.seats.len();
        if n == 0 {
            return None;
        }
        let idx = seat_index.rem_euclid(n as i64) as usize;
        Some((idx, self.seats[idx]))
    }
}

#[derive(Debug)]
pub struct DeliveryManager {
    cfg: DeliveryConfig,
    actors: BTreeMap<String, DeliveryActor>,
    processed: ProcessedEvents,
    bubbles: Vec<SpeechBubble>,
}

impl DeliveryManager {
    pub fn new(cfg: DeliveryConfig, dedup: &DedupConfig) -> Self {
        Self {
            cfg,
            actors: BTreeMap::new(),
            processed: ProcessedEvents::new(dedup),
            bubbles: Vec::new(),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.cfg
    }

    pub fn actors(&self) -> impl Iterator<Item = &DeliveryActor> {
        self.actors.values()
    }

    pub fn get(&self, id: &str) -> Option<&DeliveryActor> {
        self.actors.get(id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn bubbles(&self) -> &[SpeechBubble] {
        &self.bubbles
    }

    pub fn bubble_views(&self) -> Vec<BubbleView> {
        self.bubbles
            .iter()
            .map(|b| BubbleView {
                agent_id: b.agent_id.clone(),
                text: b.text.clone(),
                position: b.position.offset(0.0, -28.0).view(),
            })
            .collect()
    }

    pub fn processed_len(&self, category: EventCategory) -> usize {
        self.processed.len(category)
    }

    /// The single held meeting actor for an agent, if any.
    pub fn held_for(&self, agent_id: &str) -> Option<&DeliveryActor> {
        self.actors
            .values()
            .find(|a| a.is_held() && a.agent_id == agent_id)
    }

    pub fn held_for_mut(&mut self, agent_id: &str) -> Option<&mut DeliveryActor> {
        self.actors
            .values_mut()
            .find(|a| a.is_held() && a.agent_id == agent_id)
    }

    pub fn held(&self) -> impl Iterator<Item = &DeliveryActor> {
        self.actors.values().filter(|a| a.is_held())
    }

    pub fn destroy(&mut self, id: &str, arena: &mut ResourceArena) -> bool {
        match self.actors.remove(id) {
            Some(actor) => {
                arena.release(actor.handle);
                true
            }
            None => false,
        }
    }

    fn destroy_held_for(&mut self, agent_id: &str, arena: &mut ResourceArena) -> bool {
        let ids: Vec<String> = self
            .actors
            .values()
            .filter(|a| a.is_held() && a.agent_id == agent_id)
            .map(|a| a.id.clone())
            .collect();
        let mut any = false;
        for id in ids {
            any |= self.destroy(&id, arena);
        }
        any
    }

    fn spawn(&mut self, arena: &mut ResourceArena, spec: ActorSpec) {
        let sample = sample_motion(spec.origin, spec.destination, 0.0, spec.motion, &self.cfg);
        let actor = DeliveryActor {
            handle: arena.allocate(ResourceKind::Actor),
            id: spec.id,
            kind: spec.kind,
            agent_id: spec.agent_id,
            origin: spec.origin,
            destination: spec.destination,
            position: sample.position,
            progress: 0.0,
            speed: spec.speed,
            motion: spec.motion,
            hold: spec.hold,
            decision: spec.decision,
            task_id: spec.task_id,
            facing: sample.facing,
            alpha: sample.alpha,
            target: spec.target,
        };
        if let Some(old) = self.actors.insert(actor.id.clone(), actor) {
            arena.release(old.handle);
        }
    }

    pub fn ingest_handoff(
        &mut self,
        ev: &Handoff,
        stage: &Stage<'_>,
        arena: &mut ResourceArena,
    ) -> IngestOutcome {
        if self.processed.seen(EventCategory::Handoff, &ev.id) {
            return IngestOutcome::Duplicate;
        }
        let Some(dest) = stage.anchors.anchor(&ev.agent_id) else {
            trace!(id = %ev.id, "handoff deferred: no anchor");
            return IngestOutcome::Deferred;
        };
        self.spawn(
            arena,
            ActorSpec {
                id: ev.id.clone(),
                kind: DeliveryKind::Handoff,
                agent_id: ev.agent_id.clone(),
                origin: stage.handoff_origin,
                destination: dest,
                speed: self.cfg.arc_speed,
                motion: MotionKind::Arc,
                hold: None,
                decision: None,
                task_id: Some(ev.task_id.clone()),
                target: Target::Agent(ev.agent_id.clone()),
            },
        );
        self.processed.mark(EventCategory::Handoff, &ev.id);
        debug!(id = %ev.id, agent = %ev.agent_id, "handoff spawned");
        IngestOutcome::Processed
    }

    pub fn ingest_collaboration(
        &mut self,
        ev: &CrossDeptDelivery,
        stage: &Stage<'_>,
        arena: &mut ResourceArena,
    ) -> IngestOutcome {
        if self.processed.seen(EventCategory::Collaboration, &ev.id) {
            return IngestOutcome::Duplicate;
        }
        if ev.from_agent_id.is_empty() || ev.to_agent_id.is_empty() {
            // Nothing to draw, but the collaborator still needs to dequeue it.
            self.processed.mark(EventCategory::Collaboration, &ev.id);
            debug!(id = %ev.id, "collaboration without endpoints acknowledged");
            return IngestOutcome::Processed;
        }
        let (Some(from), Some(to)) = (
            stage.anchors.anchor(&ev.from_agent_id),
            stage.anchors.anchor(&ev.to_agent_id),
        ) else {
            trace!(id = %ev.id, "collaboration deferred: endpoint not laid out");
            return IngestOutcome::Deferred;
        };
        self.spawn(
            arena,
            ActorSpec {
                id: ev.id.clone(),
                kind: DeliveryKind::Collaboration,
                agent_id: ev.from_agent_id.clone(),
                origin: from,
                destination: to,
                speed: self.cfg.walk_speed,
                motion: MotionKind::Walk,
                hold: None,
                decision: None,
                task_id: None,
                target: Target::Agent(ev.to_agent_id.clone()),
            },
        );
        self.processed.mark(EventCategory::Collaboration, &ev.id);
        debug!(id = %ev.id, from = %ev.from_agent_id, to = %ev.to_agent_id, "collaboration walk spawned");
        IngestOutcome::Processed
    }

    pub fn ingest_meeting_call(
        &mut self,
        call: &CeoOfficeCall,
        stage: &Stage<'_>,
        arena: &mut ResourceArena,
        now_ms: i64,
    ) -> IngestOutcome {
        if self.processed.seen(EventCategory::Meeting, &call.id) {
            return IngestOutcome::Duplicate;
        }
        let outcome = match call.action {
            CallAction::Arrive => self.arrive(call, stage, arena, now_ms),
            CallAction::Speak => self.speak(call, stage, now_ms),
            CallAction::Dismiss => {
                let removed = self.destroy_held_for(&call.from_agent_id, arena);
                debug!(id = %call.id, agent = %call.from_agent_id, removed, "meeting dismiss");
                IngestOutcome::Processed
            }
        };
        if outcome == IngestOutcome::Processed {
            self.processed.mark(EventCategory::Meeting, &call.id);
        }
        outcome
    }

    fn arrive(
        &mut self,
        call: &CeoOfficeCall,
        stage: &Stage<'_>,
        arena: &mut ResourceArena,
        now_ms: i64,
    ) -> IngestOutcome {
        let (Some(origin), Some((seat_index, seat))) = (
            stage.anchors.anchor(&call.from_agent_id),
            stage.seat(call.seat_index),
        ) else {
            trace!(id = %call.id, "meeting arrive deferred: no anchor or seats");
            return IngestOutcome::Deferred;
        };
        self.destroy_held_for(&call.from_agent_id, arena);

        let decision = call
            .decision
            .or_else(|| call.line.as_deref().map(infer_decision))
            .unwrap_or_else(|| call.phase.default_decision());
        self.spawn(
            arena,
            ActorSpec {
                id: call.id.clone(),
                kind: DeliveryKind::Meeting,
                agent_id: call.from_agent_id.clone(),
                origin,
                destination: seat,
                speed: self.cfg.meeting_walk_speed,
                motion: MotionKind::Walk,
                hold: Some(SeatHold {
                    seat_index,
                    hold_until_ms: call
                        .hold_until
                        .unwrap_or(now_ms + self.cfg.default_hold_ms),
                    arrived: false,
                }),
                decision: Some(decision),
                task_id: call.task_id.clone(),
                target: Target::Seat,
            },
        );
        if let Some(line) = call.line.as_deref().filter(|l| !l.trim().is_empty()) {
            self.push_bubble(&call.from_agent_id, line, origin, now_ms);
        }
        debug!(id = %call.id, agent = %call.from_agent_id, seat = seat_index, "meeting arrive");
        IngestOutcome::Processed
    }

    fn speak(&mut self, call: &CeoOfficeCall, stage: &Stage<'_>, now_ms: i64) -> IngestOutcome {
        let line = call.line.as_deref().filter(|l| !l.trim().is_empty());
        let at = if let Some(actor) = self.held_for_mut(&call.from_agent_id) {
            if call.decision.is_some() || line.is_some() {
                actor.decision = Some(resolve_decision(call.decision, line));
            }
            if let Some(until) = call.hold_until {
                if let Some(hold) = actor.hold.as_mut() {
                    hold.hold_until_ms = until;
                }
            }
            if call.task_id.is_some() {
                actor.task_id = call.task_id.clone();
            }
            actor.position
        } else if let Some(anchor) = stage.anchors.anchor(&call.from_agent_id) {
            anchor
        } else {
            trace!(id = %call.id, "meeting speak deferred: speaker not on stage");
            return IngestOutcome::Deferred;
        };
        if let Some(line) = line {
            self.push_bubble(&call.from_agent_id, line, at, now_ms);
        }
        IngestOutcome::Processed
    }

    fn push_bubble(&mut self, agent_id: &str, text: &str, at: Point, now_ms: i64) {
        self.bubbles.retain(|b| b.agent_id != agent_id);
        self.bubbles.push(SpeechBubble {
            agent_id: agent_id.to_string(),
            text: text.trim().to_string(),
            position: at,
            until_ms: now_ms + self.cfg.bubble_ttl_ms,
        });
    }

    /// Insert a held actor that is already seated (no travel).
    pub fn insert_seated(
        &mut self,
        arena: &mut ResourceArena,
        agent_id: &str,
        (seat_index, seat): (usize, Point),
        hold_until_ms: i64,
        decision: MeetingDecision,
        task_id: Option<String>,
    ) -> String {
        let id = format!("presence:{agent_id}");
        self.spawn(
            arena,
            ActorSpec {
                id: id.clone(),
                kind: DeliveryKind::Meeting,
                agent_id: agent_id.to_string(),
                origin: seat,
                destination: seat,
                speed: self.cfg.meeting_walk_speed,
                motion: MotionKind::Walk,
                hold: Some(SeatHold {
                    seat_index,
                    hold_until_ms,
                    arrived: true,
                }),
                decision: Some(decision),
                task_id,
                target: Target::Seat,
            },
        );
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.progress = 1.0;
            actor.position = seat;
            actor.alpha = 1.0;
        }
        id
    }

    /// Advance every actor by one frame. Returns ids of destroyed actors.
    pub fn advance(&mut self, arena: &mut ResourceArena, now_ms: i64) -> Vec<String> {
        let mut finished = Vec::new();
        for actor in self.actors.values_mut() {
            if let Some(hold) = actor.hold.as_mut() {
                if now_ms >= hold.hold_until_ms {
                    finished.push(actor.id.clone());
                    continue;
                }
                if hold.arrived {
                    actor.position = actor.destination;
                    actor.alpha = 1.0;
                    continue;
                }
            }
            actor.progress = (actor.progress + actor.speed).min(1.0);
            if actor.progress >= 1.0 {
                match actor.hold.as_mut() {
                    Some(hold) => {
                        hold.arrived = true;
                        actor.position = actor.destination;
                        actor.alpha = 1.0;
                    }
                    None => finished.push(actor.id.clone()),
                }
                continue;
            }
            let s = sample_motion(
                actor.origin,
                actor.destination,
                actor.progress,
                actor.motion,
                &self.cfg,
            );
            actor.position = s.position;
            actor.alpha = s.alpha;
            actor.facing = s.facing;
        }
        for id in &finished {
            self.destroy(id, arena);
        }
        self.bubbles.retain(|b| b.until_ms > now_ms);
        finished
    }

    pub fn detach_all(&self, arena: &mut ResourceArena) {
        for actor in self.actors.values() {
            arena.detach(actor.handle);
        }
    }

    pub fn reattach_all(&self, arena: &mut ResourceArena) {
        for actor in self.actors.values() {
            arena.reattach(actor.handle);
        }
    }

    /// Re-resolve destinations after a layout change. Seated actors jump to
    /// their seat's new coordinates; travelling actors keep their progress.
    pub fn retarget(&mut self, stage: &Stage<'_>) {
        for actor in self.actors.values_mut() {
            let dest = match &actor.target {
                Target::Agent(id) => stage.anchors.anchor(id),
                Target::Seat => actor
                    .hold
                    .and_then(|h| stage.seat(h.seat_index as i64))
                    .map(|(_, p)| p),
            };
            let Some(dest) = dest else {
                continue;
            };
            actor.destination = dest;
            if actor.has_arrived() {
                actor.origin = dest;
                actor.position = dest;
            } else {
                let s = sample_motion(actor.origin, dest, actor.progress, actor.motion, &self.cfg);
                actor.position = s.position;
                actor.facing = s.facing;
            }
        }
    }

    pub fn release_all(&mut self, arena: &mut ResourceArena) {
        for (_, actor) in std::mem::take(&mut self.actors) {
            arena.release(actor.handle);
        }
        self.bubbles.clear();
    }
}

struct ActorSpec {
    id: String,
    kind: DeliveryKind,
    agent_id: String,
    origin: Point,
    destination: Point,
    speed: f64,
    motion: MotionKind,
    hold: Option<SeatHold>,
    decision: Option<MeetingDecision>,
    task_id: Option<String>,
    target: Target,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bureau_protocol::MeetingPhase;

    fn anchors() -> BTreeMap<String, Point> {
        BTreeMap::from([
            ("a1".to_string(), Point::new(100.0, 300.0)),
            ("b1".to_string(), Point::new(500.0, 300.0)),
        ])
    }

    fn seats() -> Vec<Point> {
        vec![Point::new(400.0, 60.0), Point::new(460.0, 60.0)]
    }

    fn manager() -> DeliveryManager {
        DeliveryManager::new(DeliveryConfig::default(), &DedupConfig::default())
    }

    fn call(id: &str, agent: &str, action: CallAction) -> CeoOfficeCall {
        CeoOfficeCall {
            id: id.into(),
            from_agent_id: agent.into(),
            seat_index: 0,
            phase: MeetingPhase::Kickoff,
            action,
            line: None,
            decision: None,
            hold_until: None,
            task_id: None,
        }
    }

    #[test]
    fn midpoint_interpolation() {
        let cfg = DeliveryConfig::default();
        let s = sample_motion(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            0.5,
            MotionKind::Walk,
            &cfg,
        );
        assert!((s.position.x - 50.0).abs() < 1e-9);
        assert!(s.position.y.abs() < 1e-6);
        let arc = sample_motion(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            0.5,
            MotionKind::Arc,
            &cfg,
        );
        assert!((arc.position.x - 50.0).abs() < 1e-9);
        assert!((arc.position.y + cfg.arc_height).abs() < 1e-9);
        assert_eq!(arc.alpha, 1.0);
    }

    #[test]
    fn arc_fades_at_extremes_and_walk_faces_travel() {
        let cfg = DeliveryConfig::default();
        let a = sample_motion(Point::default(), Point::new(10.0, 0.0), 0.0, MotionKind::Arc, &cfg);
        assert_eq!(a.alpha, 0.0);
        let w = sample_motion(
            Point::new(10.0, 0.0),
            Point::new(0.0, 0.0),
            0.3,
            MotionKind::Walk,
            &cfg,
        );
        assert_eq!(w.facing, Facing::Left);
    }

    #[test]
    fn collaboration_is_idempotent() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let ev = CrossDeptDelivery {
            id: "cd1".into(),
            from_agent_id: "a1".into(),
            to_agent_id: "b1".into(),
        };
        assert_eq!(m.ingest_collaboration(&ev, &stage, &mut arena), IngestOutcome::Processed);
        assert_eq!(m.ingest_collaboration(&ev, &stage, &mut arena), IngestOutcome::Duplicate);
        assert_eq!(m.len(), 1);
        let actor = m.get("cd1").unwrap();
        assert_eq!(actor.destination, Point::new(500.0, 300.0));
        assert_eq!(actor.motion, MotionKind::Walk);
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn missing_anchor_defers_without_marking() {
        let mut anchors = anchors();
        anchors.remove("b1");
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let ev = CrossDeptDelivery {
            id: "cd2".into(),
            from_agent_id: "a1".into(),
            to_agent_id: "b1".into(),
        };
        assert_eq!(m.ingest_collaboration(&ev, &stage, &mut arena), IngestOutcome::Deferred);
        assert_eq!(m.processed_len(EventCategory::Collaboration), 0);

        let anchors = self::anchors();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        assert_eq!(m.ingest_collaboration(&ev, &stage, &mut arena), IngestOutcome::Processed);
    }

    #[test]
    fn handoff_arcs_and_is_destroyed_on_arrival() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::new(90.0, 80.0),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let ev = Handoff::new("a1", "t9");
        assert_eq!(ev.id, "handoff:a1:t9");
        assert_eq!(m.ingest_handoff(&ev, &stage, &mut arena), IngestOutcome::Processed);
        assert_eq!(m.ingest_handoff(&ev, &stage, &mut arena), IngestOutcome::Duplicate);
        let mut removed = Vec::new();
        for _ in 0..60 {
            removed.extend(m.advance(&mut arena, 0));
        }
        assert_eq!(removed, vec!["handoff:a1:t9".to_string()]);
        assert!(m.is_empty());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn meeting_actor_holds_then_expires() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let mut c = call("m1", "a1", CallAction::Arrive);
        c.seat_index = 3;
        c.hold_until = Some(10_000);
        assert_eq!(m.ingest_meeting_call(&c, &stage, &mut arena, 0), IngestOutcome::Processed);
        for _ in 0..200 {
            m.advance(&mut arena, 1_000);
        }
        let actor = m.get("m1").unwrap();
        assert!(actor.has_arrived());
        assert_eq!(actor.hold.unwrap().seat_index, 1);
        assert_eq!(actor.position, seats[1]);
        assert_eq!(actor.decision, Some(MeetingDecision::Kickoff));

        m.advance(&mut arena, 10_000);
        assert!(m.is_empty());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn expired_hold_is_removed_next_tick_even_mid_travel() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let mut c = call("m2", "a1", CallAction::Arrive);
        c.hold_until = Some(4_999);
        m.ingest_meeting_call(&c, &stage, &mut arena, 5_000);
        assert_eq!(m.advance(&mut arena, 5_000), vec!["m2".to_string()]);
    }

    #[test]
    fn default_hold_is_ten_minutes() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        m.ingest_meeting_call(&call("m3", "a1", CallAction::Arrive), &stage, &mut arena, 1_000);
        assert_eq!(m.get("m3").unwrap().hold.unwrap().hold_until_ms, 601_000);
    }

    #[test]
    fn second_arrive_replaces_held_actor() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        m.ingest_meeting_call(&call("x1", "a1", CallAction::Arrive), &stage, &mut arena, 0);
        m.ingest_meeting_call(&call("x2", "a1", CallAction::Arrive), &stage, &mut arena, 0);
        assert_eq!(m.held().count(), 1);
        assert!(m.get("x1").is_none());
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn speak_updates_badge_and_dismiss_removes() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        m.ingest_meeting_call(&call("s0", "a1", CallAction::Arrive), &stage, &mut arena, 0);

        let mut speak = call("s1", "a1", CallAction::Speak);
        speak.line = Some("Approved, ship it".into());
        assert_eq!(m.ingest_meeting_call(&speak, &stage, &mut arena, 0), IngestOutcome::Processed);
        assert_eq!(m.held_for("a1").unwrap().decision, Some(MeetingDecision::Approved));
        assert_eq!(m.bubbles().len(), 1);
        assert_eq!(m.ingest_meeting_call(&speak, &stage, &mut arena, 0), IngestOutcome::Duplicate);

        let mut vague = call("s2", "a1", CallAction::Speak);
        vague.line = Some("let me think about the numbers".into());
        m.ingest_meeting_call(&vague, &stage, &mut arena, 0);
        assert_eq!(m.held_for("a1").unwrap().decision, Some(MeetingDecision::Reviewing));

        let mut dismiss = call("s3", "a1", CallAction::Dismiss);
        dismiss.hold_until = Some(i64::MAX);
        assert_eq!(m.ingest_meeting_call(&dismiss, &stage, &mut arena, 0), IngestOutcome::Processed);
        assert!(m.held_for("a1").is_none());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn bubbles_expire() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        let mut speak = call("b1", "b1", CallAction::Speak);
        speak.line = Some("hello".into());
        assert_eq!(m.ingest_meeting_call(&speak, &stage, &mut arena, 0), IngestOutcome::Processed);
        assert_eq!(m.bubbles().len(), 1);
        m.advance(&mut arena, m.config().bubble_ttl_ms);
        assert!(m.bubbles().is_empty());
    }

    #[test]
    fn retarget_moves_seated_actor_with_its_seat() {
        let anchors = anchors();
        let seats = seats();
        let stage = Stage {
            anchors: &anchors,
            seats: &seats,
            handoff_origin: Point::default(),
        };
        let mut arena = ResourceArena::new();
        let mut m = manager();
        m.insert_seated(&mut arena, "a1", (1, seats[1]), 9_999, MeetingDecision::Hold, None);

        let moved = vec![Point::new(0.0, 0.0), Point::new(700.0, 90.0)];
        let stage = Stage {
            anchors: &anchors,
            seats: &moved,
            handoff_origin: Point::default(),
        };
        m.retarget(&stage);
        assert_eq!(m.held_for("a1").unwrap().position, Point::new(700.0, 90.0));
    }
}
