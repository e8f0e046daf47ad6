//! Responsive office layout.
//!
//! The builder is a pure function of the domain snapshot, canvas width, locale
//! and theme overrides. It never touches delivery or presence actors; callers
//! keep those alive across rebuilds.

use std::collections::BTreeMap;

use bureau_protocol::{Agent, AgentStatus, Department, DepartmentTheme, OfficeSnapshot};

use crate::config::LayoutConfig;
use crate::geometry::{Point, Rect};
use crate::resources::NodeKey;
use crate::stable_hash;

pub const BREAK_SPOTS: usize = 6;

const DEFAULT_THEMES: [(&str, &str, &str, &str); 6] = [
    ("#2b3a55", "#243149", "#1a2438", "#6ff8ff"),
    ("#3a2f4f", "#312843", "#221c30", "#c79bff"),
    ("#2f4a3c", "#283f33", "#1c2d24", "#7dffb2"),
    ("#4d3b2a", "#423224", "#2e2319", "#ffc46b"),
    ("#4a2f36", "#40282e", "#2d1c20", "#ff8fa8"),
    ("#2f4650", "#283c45", "#1c2a31", "#8fd8ff"),
];

pub fn default_theme(index: usize) -> DepartmentTheme {
    let (floor1, floor2, wall, accent) = DEFAULT_THEMES[index % DEFAULT_THEMES.len()];
    DepartmentTheme {
        floor1: floor1.to_string(),
        floor2: floor2.to_string(),
        wall: wall.to_string(),
        accent: accent.to_string(),
    }
}

pub struct LayoutInput<'a> {
    pub snapshot: &'a OfficeSnapshot,
    pub canvas_width: f64,
    pub locale: &'a str,
    pub theme_overrides: &'a BTreeMap<String, DepartmentTheme>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomRect {
    pub department_id: String,
    pub rect: Rect,
    pub label: String,
    pub icon: String,
    pub theme: DepartmentTheme,
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeskSlot {
    pub agent_id: String,
    pub department_id: String,
    pub slot: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Desk,
    BreakRoom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelperSlot {
    pub id: String,
    pub parent_agent_id: String,
    pub point: Point,
    pub working: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FurnitureKind {
    CeoDesk,
    MeetingTable,
    Plant,
    WallClock,
    CoffeeMachine,
    Sofa,
}

impl FurnitureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CeoDesk => "ceo_desk",
            Self::MeetingTable => "meeting_table",
            Self::Plant => "plant",
            Self::WallClock => "wall_clock",
            Self::CoffeeMachine => "coffee_machine",
            Self::Sofa => "sofa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Furniture {
    pub kind: FurnitureKind,
    pub point: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone<'a> {
    Department(&'a str),
    Leadership,
    BreakRoom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfficeLayout {
    pub width: f64,
    pub height: f64,
    pub columns: usize,
    pub rows: usize,
    pub room_width: f64,
    pub room_height: f64,
    pub agents_per_row: usize,
    pub leadership: Rect,
    pub break_room: Rect,
    pub rooms: Vec<RoomRect>,
    pub desks: Vec<DeskSlot>,
    pub anchors: BTreeMap<String, Anchor>,
    pub helpers: Vec<HelperSlot>,
    pub seats: Vec<Point>,
    pub break_spots: Vec<Point>,
    pub furniture: Vec<Furniture>,
    pub handoff_origin: Point,
}

impl OfficeLayout {
    pub fn anchor(&self, agent_id: &str) -> Option<Point> {
        self.anchors.get(agent_id).map(|a| a.point)
    }

    pub fn room_at(&self, p: Point) -> Option<&RoomRect> {
        self.rooms.iter().find(|r| r.rect.contains(p))
    }

    pub fn zone_at(&self, p: Point) -> Option<Zone<'_>> {
        if let Some(room) = self.room_at(p) {
            return Some(Zone::Department(&room.department_id));
        }
        if self.leadership.contains(p) {
            return Some(Zone::Leadership);
        }
        if self.break_room.contains(p) {
            return Some(Zone::BreakRoom);
        }
        None
    }

    /// Seat for a server-provided index; any integer maps onto the table.
    pub fn seat(&self, seat_index: i64) -> Option<(usize, Point)> {
        let n = self.seats.len();
        if n == 0 {
            return None;
        }
        let idx = seat_index.rem_euclid(n as i64) as usize;
        Some((idx, self.seats[idx]))
    }

    pub fn node_keys(&self) -> Vec<NodeKey> {
        let mut keys = vec![NodeKey::Zone("leadership"), NodeKey::Zone("break")];
        for room in &self.rooms {
            keys.push(NodeKey::Room(room.department_id.clone()));
            keys.push(NodeKey::Sign(room.department_id.clone()));
            if room.empty {
                keys.push(NodeKey::Placeholder(room.department_id.clone()));
            }
        }
        keys.extend(self.desks.iter().map(|d| NodeKey::Desk(d.agent_id.clone())));
        keys.extend(self.anchors.keys().map(|id| NodeKey::Agent(id.clone())));
        keys.extend(self.helpers.iter().map(|h| NodeKey::Helper(h.id.clone())));
        keys.extend((0..self.seats.len()).map(NodeKey::Seat));
        keys
    }
}

fn required_width(columns: usize, cfg: &LayoutConfig) -> f64 {
    let c = columns as f64;
    c * cfg.min_room_width + (c - 1.0).max(0.0) * cfg.gap + 2.0 * cfg.padding
}

/// Largest column count (at most `max_columns`, at most one per department)
/// whose minimum-width rooms fit the canvas. Never below one.
pub fn choose_columns(department_count: usize, canvas_width: f64, cfg: &LayoutConfig) -> usize {
    let mut columns = department_count.min(cfg.max_columns).max(1);
    while columns > 1 && required_width(columns, cfg) > canvas_width {
        columns -= 1;
    }
    columns
}

fn role_rank(role: &str) -> u8 {
    match role.trim().to_ascii_lowercase().as_str() {
        "team_leader" | "lead" | "manager" => 0,
        "senior" => 1,
        "junior" => 2,
        "intern" => 3,
        _ => 4,
    }
}

/// Desk order inside a room: role, then name, then id. Independent of the
/// order agents arrive in, so desks do not shuffle between rebuilds.
pub fn sort_for_desks(agents: &mut [&Agent]) {
    agents.sort_by(|a, b| {
        role_rank(&a.role)
            .cmp(&role_rank(&b.role))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn hash_offset(id: &str) -> (f64, f64) {
    let h = stable_hash(id);
    let dx = (h % 13) as f64 - 6.0;
    let dy = ((h >> 16) % 7) as f64 - 3.0;
    (dx, dy)
}

fn meeting_seats(table: Point, count: usize) -> Vec<Point> {
    let top = count.div_ceil(2);
    let bottom = count - top;
    let spacing = 58.0;
    let row = |n: usize, y: f64| -> Vec<Point> {
        let span = (n.saturating_sub(1)) as f64 * spacing;
        (0..n)
            .map(|i| Point::new(table.x - span / 2.0 + i as f64 * spacing, y))
            .collect()
    };
    let mut seats = row(top, table.y - 34.0);
    seats.extend(row(bottom, table.y + 34.0));
    seats
}

fn break_room_furniture(room: Rect) -> (Vec<Furniture>, Vec<Point>) {
    let coffee = Point::new(room.x + 40.0, room.y + 42.0);
    let sofa = Point::new(room.center().x, room.y + room.h * 0.45);
    let plant = Point::new(room.x + room.w - 28.0, room.y + 30.0);
    let furniture = vec![
        Furniture {
            kind: FurnitureKind::CoffeeMachine,
            point: coffee,
        },
        Furniture {
            kind: FurnitureKind::Sofa,
            point: sofa,
        },
        Furniture {
            kind: FurnitureKind::Plant,
            point: plant,
        },
    ];
    let front = room.y + room.h * 0.72;
    let spots = vec![
        Point::new(coffee.x + 10.0, coffee.y + 38.0),
        Point::new(coffee.x + 52.0, coffee.y + 38.0),
        Point::new(sofa.x - 70.0, front),
        Point::new(sofa.x - 24.0, front),
        Point::new(sofa.x + 24.0, front),
        Point::new(sofa.x + 70.0, front),
    ];
    debug_assert_eq!(spots.len(), BREAK_SPOTS);
    (furniture, spots)
}

pub fn build_layout(input: &LayoutInput<'_>, cfg: &LayoutConfig) -> OfficeLayout {
    let snapshot = input.snapshot;

    let mut departments: Vec<&Department> = snapshot.departments.iter().collect();
    departments.sort_by_key(|d| d.sort_order);

    let columns = choose_columns(departments.len(), input.canvas_width, cfg);
    let rows = departments.len().div_ceil(columns);
    let width = input.canvas_width.max(required_width(columns, cfg));
    let inner_width = width - 2.0 * cfg.padding;
    let room_width = cfg
        .min_room_width
        .max((inner_width - (columns as f64 - 1.0) * cfg.gap) / columns as f64);

    let mut desk_agents: BTreeMap<&str, Vec<&Agent>> = BTreeMap::new();
    let mut on_break: Vec<&Agent> = Vec::new();
    for agent in &snapshot.agents {
        if agent.status == AgentStatus::Break {
            on_break.push(agent);
            continue;
        }
        if let Some(dept) = agent.department_id.as_deref() {
            if departments.iter().any(|d| d.id == dept) {
                desk_agents.entry(dept).or_default().push(agent);
            }
        }
    }
    for list in desk_agents.values_mut() {
        sort_for_desks(list);
    }

    let agents_per_row = (((room_width - 2.0 * cfg.room_inner_pad) / cfg.desk_slot_width).floor()
        as usize)
        .max(1);
    let max_agents = desk_agents.values().map(Vec::len).max().unwrap_or(0);
    let agent_rows = max_agents.div_ceil(agents_per_row).max(1);
    let room_height = cfg.min_room_height.max(
        agent_rows as f64 * cfg.desk_slot_height + cfg.room_header + cfg.room_inner_pad,
    );

    let leadership = Rect::new(cfg.padding, cfg.padding, inner_width, cfg.leadership_height);
    let grid_top = leadership.bottom() + cfg.gap;
    let grid_height = if rows == 0 {
        0.0
    } else {
        rows as f64 * room_height + (rows as f64 - 1.0) * cfg.gap
    };
    let break_top = if rows == 0 {
        grid_top
    } else {
        grid_top + grid_height + cfg.gap
    };
    let break_room = Rect::new(cfg.padding, break_top, inner_width, cfg.break_room_height);
    let height = break_room.bottom() + cfg.padding;

    let ceo_desk = Point::new(leadership.x + 90.0, leadership.center().y);
    let table = Point::new(leadership.x + leadership.w * 0.62, leadership.center().y);
    let mut furniture = vec![
        Furniture {
            kind: FurnitureKind::CeoDesk,
            point: ceo_desk,
        },
        Furniture {
            kind: FurnitureKind::MeetingTable,
            point: table,
        },
        Furniture {
            kind: FurnitureKind::WallClock,
            point: Point::new(leadership.center().x, leadership.y + 14.0),
        },
    ];
    let seats = meeting_seats(table, cfg.meeting_seats);

    let mut rooms = Vec::with_capacity(departments.len());
    let mut desks = Vec::new();
    let mut anchors = BTreeMap::new();

    for (i, dept) in departments.iter().enumerate() {
        let col = i % columns;
        let row = i / columns;
        let rect = Rect::new(
            cfg.padding + col as f64 * (room_width + cfg.gap),
            grid_top + row as f64 * (room_height + cfg.gap),
            room_width,
            room_height,
        );
        let theme = input
            .theme_overrides
            .get(&dept.id)
            .or(dept.theme.as_ref())
            .cloned()
            .unwrap_or_else(|| default_theme(i));
        let members = desk_agents.get(dept.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);

        for (slot, agent) in members.iter().enumerate() {
            let slot_col = slot % agents_per_row;
            let slot_row = slot / agents_per_row;
            let x = rect.x + cfg.room_inner_pad + slot_col as f64 * cfg.desk_slot_width;
            let y = rect.y + cfg.room_header + slot_row as f64 * cfg.desk_slot_height;
            desks.push(DeskSlot {
                agent_id: agent.id.clone(),
                department_id: dept.id.clone(),
                slot,
                rect: Rect::new(
                    x + 8.0,
                    y + cfg.desk_slot_height * 0.5,
                    cfg.desk_slot_width - 16.0,
                    cfg.desk_slot_height * 0.32,
                ),
            });
            anchors.insert(
                agent.id.clone(),
                Anchor {
                    point: Point::new(
                        x + cfg.desk_slot_width / 2.0,
                        y + cfg.desk_slot_height * 0.38,
                    ),
                    placement: Placement::Desk,
                },
            );
        }

        furniture.push(Furniture {
            kind: FurnitureKind::Plant,
            point: Point::new(rect.x + rect.w - 18.0, rect.y + 18.0),
        });
        furniture.push(Furniture {
            kind: FurnitureKind::WallClock,
            point: Point::new(rect.center().x, rect.y + 10.0),
        });

        rooms.push(RoomRect {
            department_id: dept.id.clone(),
            rect,
            label: dept.display_name(input.locale).to_string(),
            icon: dept.icon.clone(),
            theme,
            empty: members.is_empty(),
        });
    }

    let (break_furniture, break_spots) = break_room_furniture(break_room);
    furniture.extend(break_furniture);

    on_break.sort_by(|a, b| a.id.cmp(&b.id));
    for (i, agent) in on_break.iter().enumerate() {
        let base = break_spots[i % break_spots.len()];
        let (dx, dy) = hash_offset(&agent.id);
        anchors.insert(
            agent.id.clone(),
            Anchor {
                point: base.offset(dx, dy),
                placement: Placement::BreakRoom,
            },
        );
    }

    let mut helpers = Vec::new();
    let mut per_parent: BTreeMap<&str, usize> = BTreeMap::new();
    let mut sub_agents: Vec<_> = snapshot.sub_agents.iter().collect();
    sub_agents.sort_by(|a, b| a.id.cmp(&b.id));
    for sub in sub_agents {
        let Some(parent) = anchors.get(&sub.parent_agent_id) else {
            continue;
        };
        if parent.placement != Placement::Desk {
            continue;
        }
        let n = per_parent.entry(sub.parent_agent_id.as_str()).or_insert(0);
        helpers.push(HelperSlot {
            id: sub.id.clone(),
            parent_agent_id: sub.parent_agent_id.clone(),
            point: parent
                .point
                .offset(cfg.desk_slot_width * 0.32 + *n as f64 * 7.0, 12.0),
            working: sub.status == AgentStatus::Working,
        });
        *n += 1;
    }

    OfficeLayout {
        width,
        height,
        columns,
        rows,
        room_width,
        room_height,
        agents_per_row,
        leadership,
        break_room,
        rooms,
        desks,
        anchors,
        helpers,
        seats,
        break_spots,
        furniture,
        handoff_origin: ceo_desk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bureau_protocol::SubAgent;

    fn dept(id: &str) -> Department {
        Department {
            id: id.into(),
            name: id.to_uppercase(),
            localized_names: BTreeMap::new(),
            icon: String::new(),
            theme: None,
            sort_order: 0,
        }
    }

    fn agent(id: &str, dept: &str, status: AgentStatus) -> Agent {
        Agent {
            id: id.into(),
            name: id.into(),
            department_id: Some(dept.into()),
            status,
            current_task_id: None,
            cli_provider: None,
            role: String::new(),
            avatar_emoji: None,
            sprite: None,
        }
    }

    fn build(snapshot: &OfficeSnapshot, width: f64) -> OfficeLayout {
        let overrides = BTreeMap::new();
        build_layout(
            &LayoutInput {
                snapshot,
                canvas_width: width,
                locale: "en",
                theme_overrides: &overrides,
            },
            &LayoutConfig::default(),
        )
    }

    #[test]
    fn columns_follow_available_width() {
        let cfg = LayoutConfig::default();
        assert_eq!(choose_columns(6, 1200.0, &cfg), 3);
        assert_eq!(choose_columns(6, 500.0, &cfg), 1);
        assert_eq!(choose_columns(2, 900.0, &cfg), 2);
        assert_eq!(choose_columns(0, 900.0, &cfg), 1);
        for width in [300.0, 600.0, 700.0, 900.0, 1200.0] {
            let c = choose_columns(6, width, &cfg);
            assert!(c == 1 || required_width(c, &cfg) <= width);
        }
    }

    #[test]
    fn rooms_fill_canvas_width() {
        let snapshot = OfficeSnapshot {
            departments: (0..6).map(|i| dept(&format!("d{i}"))).collect(),
            ..Default::default()
        };
        let layout = build(&snapshot, 1200.0);
        assert_eq!(layout.columns, 3);
        assert_eq!(layout.rows, 2);
        let last = &layout.rooms[2].rect;
        assert!((last.x + last.w - (1200.0 - 24.0)).abs() < 1e-6);
        assert!(layout.rooms.iter().all(|r| r.empty));
        assert!(layout.anchors.is_empty());
    }

    #[test]
    fn break_agents_leave_their_desk() {
        let snapshot = OfficeSnapshot {
            departments: vec![dept("a")],
            agents: vec![
                agent("a1", "a", AgentStatus::Working),
                agent("a2", "a", AgentStatus::Break),
            ],
            ..Default::default()
        };
        let layout = build(&snapshot, 900.0);
        assert_eq!(layout.desks.len(), 1);
        assert_eq!(layout.anchors.len(), 2);
        let a2 = layout.anchors["a2"];
        assert_eq!(a2.placement, Placement::BreakRoom);
        assert!(layout.break_room.contains(a2.point));
    }

    #[test]
    fn desk_order_ignores_input_order() {
        let mut agents = vec![
            agent("z", "a", AgentStatus::Idle),
            agent("m", "a", AgentStatus::Idle),
            agent("b", "a", AgentStatus::Idle),
        ];
        let first = build(
            &OfficeSnapshot {
                departments: vec![dept("a")],
                agents: agents.clone(),
                ..Default::default()
            },
            900.0,
        );
        agents.reverse();
        let second = build(
            &OfficeSnapshot {
                departments: vec![dept("a")],
                agents,
                ..Default::default()
            },
            900.0,
        );
        assert_eq!(first.anchors, second.anchors);
        assert_eq!(first.desks[0].agent_id, "b");
    }

    #[test]
    fn leaders_take_the_first_desk() {
        let mut lead = agent("zz", "a", AgentStatus::Idle);
        lead.role = "team_leader".into();
        let layout = build(
            &OfficeSnapshot {
                departments: vec![dept("a")],
                agents: vec![agent("aa", "a", AgentStatus::Idle), lead],
                ..Default::default()
            },
            900.0,
        );
        assert_eq!(layout.desks[0].agent_id, "zz");
    }

    #[test]
    fn room_height_grows_with_the_fullest_department() {
        let agents = (0..12)
            .map(|i| agent(&format!("x{i}"), "a", AgentStatus::Idle))
            .collect();
        let layout = build(
            &OfficeSnapshot {
                departments: vec![dept("a"), dept("b")],
                agents,
                ..Default::default()
            },
            900.0,
        );
        let rows = 12usize.div_ceil(layout.agents_per_row) as f64;
        let cfg = LayoutConfig::default();
        assert!(layout.room_height >= rows * cfg.desk_slot_height + cfg.room_header);
        assert_eq!(layout.rooms[0].rect.h, layout.rooms[1].rect.h);
        assert!(layout.rooms[1].empty);
        assert!(layout.height > layout.break_room.y);
    }

    #[test]
    fn seat_index_wraps() {
        let layout = build(&OfficeSnapshot::default(), 900.0);
        let (idx, _) = layout.seat(7).unwrap();
        assert_eq!(idx, 1);
        let (idx, _) = layout.seat(-1).unwrap();
        assert_eq!(idx, 5);
    }

    #[test]
    fn helpers_sit_beside_desk_parents_only() {
        let snapshot = OfficeSnapshot {
            departments: vec![dept("a")],
            agents: vec![
                agent("p", "a", AgentStatus::Working),
                agent("q", "a", AgentStatus::Break),
            ],
            sub_agents: vec![
                SubAgent {
                    id: "s1".into(),
                    parent_agent_id: "p".into(),
                    status: AgentStatus::Working,
                    task: None,
                },
                SubAgent {
                    id: "s2".into(),
                    parent_agent_id: "q".into(),
                    status: AgentStatus::Idle,
                    task: None,
                },
            ],
            ..Default::default()
        };
        let layout = build(&snapshot, 900.0);
        assert_eq!(layout.helpers.len(), 1);
        assert!(layout.helpers[0].working);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let snapshot = OfficeSnapshot {
            departments: vec![dept("a"), dept("b")],
            agents: vec![agent("a1", "a", AgentStatus::Idle)],
            ..Default::default()
        };
        assert_eq!(build(&snapshot, 900.0), build(&snapshot, 900.0));
    }
}
