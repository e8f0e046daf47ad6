use std::collections::BTreeMap;

use bureau_protocol::{
    AgentStatus, AgentView, Appearance, CliUsage, OfficeSnapshot, Pose, StressLevel,
};

use crate::geometry::Point;
use crate::layout::{OfficeLayout, Placement};
use crate::sprites::SpriteCatalog;
use crate::stable_hash;
use crate::stress::stress_for_provider;

/// Anything that can answer "where is this agent drawn right now".
pub trait AnchorLookup {
    fn anchor(&self, agent_id: &str) -> Option<Point>;
}

impl AnchorLookup for OfficeLayout {
    fn anchor(&self, agent_id: &str) -> Option<Point> {
        OfficeLayout::anchor(self, agent_id)
    }
}

impl AnchorLookup for BTreeMap<String, Point> {
    fn anchor(&self, agent_id: &str) -> Option<Point> {
        self.get(agent_id).copied()
    }
}

const REST_OFFSET: (f64, f64) = (10.0, 16.0);

#[derive(Debug, Clone, PartialEq)]
pub struct AgentActor {
    pub agent_id: String,
    pub name: String,
    pub anchor: Point,
    pub placement: Placement,
    pub status: AgentStatus,
    pub cli_provider: Option<String>,
    pub task_title: Option<String>,
    pub appearance: Appearance,
    /// Per-agent stagger so periodic effects do not fire on the same frame.
    pub phase: u64,
    pub stress: StressLevel,
    pub pose: Pose,
    pub position: Point,
}

impl AgentActor {
    pub fn desk_bound(&self) -> bool {
        self.placement == Placement::Desk
    }

    pub fn view(&self) -> AgentView {
        AgentView {
            id: self.agent_id.clone(),
            name: self.name.clone(),
            position: self.position.view(),
            pose: self.pose,
            stress: self.stress,
            appearance: self.appearance.clone(),
            task_title: self.task_title.clone(),
        }
    }
}

fn base_pose(status: AgentStatus, placement: Placement) -> Pose {
    match (placement, status) {
        (Placement::BreakRoom, _) => Pose::Resting,
        (_, AgentStatus::Working) => Pose::Working,
        (_, AgentStatus::Offline) => Pose::Away,
        _ => Pose::Idle,
    }
}

#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: BTreeMap<String, AgentActor>,
}

impl ActorRegistry {
    /// Rebuild from the latest layout. Only agents with an anchor are kept.
    pub fn rebuild(&mut self, layout: &OfficeLayout, snapshot: &OfficeSnapshot, sprites: &SpriteCatalog) {
        let icons: BTreeMap<&str, &str> = snapshot
            .departments
            .iter()
            .map(|d| (d.id.as_str(), d.icon.as_str()))
            .collect();
        let titles: BTreeMap<&str, &str> = snapshot
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.title.as_str()))
            .collect();

        let mut next = BTreeMap::new();
        for agent in &snapshot.agents {
            let Some(anchor) = layout.anchors.get(&agent.id) else {
                continue;
            };
            let glyph = agent
                .avatar_emoji
                .as_deref()
                .or_else(|| {
                    agent
                        .department_id
                        .as_deref()
                        .and_then(|d| icons.get(d).copied())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or("🧑");
            let previous = self.actors.get(&agent.id);
            let actor = AgentActor {
                agent_id: agent.id.clone(),
                name: agent.name.clone(),
                anchor: anchor.point,
                placement: anchor.placement,
                status: agent.status,
                cli_provider: agent.cli_provider.clone(),
                task_title: agent
                    .current_task_id
                    .as_deref()
                    .and_then(|t| titles.get(t))
                    .map(|t| t.to_string()),
                appearance: sprites.appearance(agent.sprite.as_deref(), glyph),
                phase: stable_hash(&agent.id),
                stress: previous.map(|p| p.stress).unwrap_or_default(),
                pose: base_pose(agent.status, anchor.placement),
                position: anchor.point,
            };
            next.insert(agent.id.clone(), actor);
        }
        self.actors = next;
    }

    /// Recompute stress, pose and position for one frame.
    pub fn advance(&mut self, tick: u64, usage: &CliUsage) {
        for actor in self.actors.values_mut() {
            actor.stress = stress_for_provider(usage, actor.cli_provider.as_deref());
            if actor.stress == StressLevel::Collapsed {
                actor.pose = Pose::Collapsed;
                actor.position = actor.anchor.offset(REST_OFFSET.0, REST_OFFSET.1);
                continue;
            }
            actor.pose = base_pose(actor.status, actor.placement);
            actor.position = if actor.pose == Pose::Working {
                let t = tick.wrapping_add(actor.phase % 64) as f64;
                actor.anchor.offset(0.0, (t * 0.35).sin() * 0.8)
            } else {
                actor.anchor
            };
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentActor> {
        self.actors.get(agent_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentActor> {
        self.actors.values()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Closest drawn agent within `radius` of `p`.
    pub fn nearest(&self, p: Point, radius: f64) -> Option<&AgentActor> {
        self.actors
            .values()
            .map(|a| (a.position.distance(p), a))
            .filter(|(d, _)| *d <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, a)| a)
    }
}

impl AnchorLookup for ActorRegistry {
    fn anchor(&self, agent_id: &str) -> Option<Point> {
        self.actors.get(agent_id).map(|a| a.anchor)
    }
}
