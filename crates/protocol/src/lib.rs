use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Domain snapshot (read-only for the scene; the engine never mutates it).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentTheme {
    pub floor1: String,
    pub floor2: String,
    pub wall: String,
    pub accent: String,
}

impl Default for DepartmentTheme {
    fn default() -> Self {
        Self {
            floor1: "#2b3a55".to_string(),
            floor2: "#243149".to_string(),
            wall: "#1a2438".to_string(),
            accent: "#6ff8ff".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub localized_names: BTreeMap<String, String>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub theme: Option<DepartmentTheme>,
    #[serde(default)]
    pub sort_order: i64,
}

impl Department {
    pub fn display_name(&self, locale: &str) -> &str {
        self.localized_names
            .get(locale)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Working,
    Break,
    Offline,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub cli_provider: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub avatar_emoji: Option<String>,
    #[serde(default)]
    pub sprite: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgent {
    pub id: String,
    pub parent_agent_id: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficeSnapshot {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, rename = "subAgents", alias = "sub_agents")]
    pub sub_agents: Vec<SubAgent>,
}

// ---------------------------------------------------------------------------
// Meetings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingDecision {
    Kickoff,
    Reviewing,
    #[serde(alias = "approve")]
    Approved,
    #[serde(alias = "on_hold", alias = "hold_off")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPhase {
    #[default]
    Kickoff,
    #[serde(other)]
    Review,
}

impl MeetingPhase {
    pub fn default_decision(self) -> MeetingDecision {
        match self {
            Self::Kickoff => MeetingDecision::Kickoff,
            Self::Review => MeetingDecision::Reviewing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingPresenceRow {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub seat_index: i64,
    #[serde(default)]
    pub phase: MeetingPhase,
    #[serde(default, deserialize_with = "lenient_decision")]
    pub decision: Option<MeetingDecision>,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Missing or unreadable expiry reads as 0, i.e. already expired.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub until: i64,
}

fn number_of(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer fields sent by JS clients: `null`, floats and numeric strings are accepted.
fn lenient_i64<'de, D: serde::Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(number_of).unwrap_or(0))
}

fn lenient_opt_i64<'de, D: serde::Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(number_of))
}

/// Unknown badge names read as absent so the line heuristic or phase default applies.
fn lenient_decision<'de, D: serde::Deserializer<'de>>(
    de: D,
) -> Result<Option<MeetingDecision>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossDeptDelivery {
    pub id: String,
    #[serde(default)]
    pub from_agent_id: String,
    #[serde(default)]
    pub to_agent_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAction {
    #[default]
    Arrive,
    Speak,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeoOfficeCall {
    pub id: String,
    #[serde(default)]
    pub from_agent_id: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub seat_index: i64,
    #[serde(default)]
    pub phase: MeetingPhase,
    #[serde(default)]
    pub action: CallAction,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default, deserialize_with = "lenient_decision")]
    pub decision: Option<MeetingDecision>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub hold_until: Option<i64>,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushEvent {
    TaskUpdate(serde_json::Value),
    AgentStatus(serde_json::Value),
    CrossDeptDelivery(CrossDeptDelivery),
    CeoOfficeCall(CeoOfficeCall),
    SubtaskUpdate(serde_json::Value),
}

impl PushEvent {
    /// Events that only signal "the domain snapshot changed" and carry no scene actor.
    pub fn requests_refresh(&self) -> bool {
        matches!(
            self,
            Self::TaskUpdate(_) | Self::AgentStatus(_) | Self::SubtaskUpdate(_)
        )
    }
}

// ---------------------------------------------------------------------------
// CLI usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageWindow {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CliUsage(pub BTreeMap<String, Vec<UsageWindow>>);

impl CliUsage {
    /// Peak utilization across all windows reported for a provider.
    pub fn peak(&self, provider: &str) -> Option<f64> {
        let windows = self.0.get(provider)?;
        windows
            .iter()
            .map(|w| w.utilization)
            .filter(|u| u.is_finite())
            .reduce(f64::max)
    }
}

// ---------------------------------------------------------------------------
// Operator input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadButton {
    Up,
    Down,
    Left,
    Right,
    Interact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputCommand {
    KeyDown { direction: Direction },
    KeyUp { direction: Direction },
    PadPress { button: PadButton },
    PadRelease { button: PadButton },
    Interact,
    Pick { x: f64, y: f64 },
    Viewport { width: f64, height: f64 },
    CanvasWidth { width: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub theme_overrides: Option<BTreeMap<String, DepartmentTheme>>,
}

// ---------------------------------------------------------------------------
// Outputs to collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneNotification {
    SelectAgent { agent_id: String },
    SelectDepartment { department_id: String },
    CrossDeptDeliveryProcessed { id: String },
    CeoOfficeCallProcessed { id: String },
    OpenMeetingMinutes { task_id: String },
}

impl SceneNotification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SelectAgent { .. } => "agent.selected",
            Self::SelectDepartment { .. } => "department.selected",
            Self::CrossDeptDeliveryProcessed { .. } => "cross_dept_delivery.processed",
            Self::CeoOfficeCallProcessed { .. } => "ceo_office_call.processed",
            Self::OpenMeetingMinutes { .. } => "meeting_minutes.open",
        }
    }
}

// ---------------------------------------------------------------------------
// Render output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointView {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectView {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Appearance {
    Sprite { key: String },
    Glyph { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    #[default]
    Normal,
    Sweat,
    Stressed,
    Collapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pose {
    #[default]
    Idle,
    Working,
    Resting,
    Collapsed,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Handoff,
    Collaboration,
    Meeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionKind {
    Arc,
    Walk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleKind {
    Spark,
    Sweat,
    Sleep,
    Steam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub department_id: String,
    pub label: String,
    pub icon: String,
    pub rect: RectView,
    pub theme: DepartmentTheme,
    pub highlighted: bool,
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneView {
    pub kind: String,
    pub rect: RectView,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskView {
    pub agent_id: String,
    pub rect: RectView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub position: PointView,
    pub pose: Pose,
    pub stress: StressLevel,
    pub appearance: Appearance,
    pub task_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurnitureView {
    pub kind: String,
    pub position: PointView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperView {
    pub id: String,
    pub parent_agent_id: String,
    pub position: PointView,
    pub working: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryView {
    pub id: String,
    pub kind: DeliveryKind,
    pub agent_id: String,
    pub position: PointView,
    pub alpha: f64,
    pub facing: Facing,
    pub arrived: bool,
    pub decision: Option<MeetingDecision>,
    pub seat_index: Option<usize>,
    pub appearance: Appearance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleView {
    pub kind: ParticleKind,
    pub position: PointView,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleView {
    pub agent_id: String,
    pub text: String,
    pub position: PointView,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockView {
    pub hour_angle: f64,
    pub minute_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AmbientView {
    pub sway: f64,
    pub steam_on: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneFrame {
    pub tick: u64,
    pub width: f64,
    pub height: f64,
    pub columns: usize,
    pub locale: String,
    pub rooms: Vec<RoomView>,
    pub zones: Vec<ZoneView>,
    pub desks: Vec<DeskView>,
    pub seats: Vec<PointView>,
    pub furniture: Vec<FurnitureView>,
    pub agents: Vec<AgentView>,
    pub helpers: Vec<HelperView>,
    pub deliveries: Vec<DeliveryView>,
    pub particles: Vec<ParticleView>,
    pub bubbles: Vec<BubbleView>,
    pub clock: ClockView,
    pub ambient: AmbientView,
    pub avatar: PointView,
    pub camera: PointView,
}

// ---------------------------------------------------------------------------
// UI patch envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Swap {
    #[default]
    Replace,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub target: String,
    #[serde(default)]
    pub swap: Swap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiUpdate {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub patches: Vec<Patch>,
}

impl UiUpdate {
    pub fn new(event: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            event: event.into(),
            payload: None,
            patches,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

pub mod targets {
    pub const PANEL_AGENT: &str = "panel.agent";
    pub const PANEL_DEPARTMENT: &str = "panel.department";
    pub const PANEL_MEETING_MINUTES: &str = "panel.meeting_minutes";
    pub const EVENT_QUEUE: &str = "queue.events";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceo_call_defaults_missing_fields() {
        let ev: PushEvent = serde_json::from_str(
            r#"{"type":"ceo_office_call","payload":{"id":"c1","from_agent_id":"a1"}}"#,
        )
        .unwrap();
        let PushEvent::CeoOfficeCall(call) = ev else {
            panic!("wrong variant");
        };
        assert_eq!(call.seat_index, 0);
        assert_eq!(call.action, CallAction::Arrive);
        assert_eq!(call.hold_until, None);
        assert_eq!(call.phase, MeetingPhase::Kickoff);
    }

    #[test]
    fn ceo_call_tolerates_js_numbers_and_unknown_decision() {
        let parse = |payload: &str| -> CeoOfficeCall {
            let raw = format!(r#"{{"type":"ceo_office_call","payload":{payload}}}"#);
            match serde_json::from_str(&raw).unwrap() {
                PushEvent::CeoOfficeCall(call) => call,
                other => panic!("wrong variant: {other:?}"),
            }
        };

        let call = parse(r#"{"id":"c1","from_agent_id":"a1","seat_index":null}"#);
        assert_eq!(call.seat_index, 0);

        let call = parse(r#"{"id":"c2","from_agent_id":"a1","seat_index":2.0,"hold_until":1.5e3}"#);
        assert_eq!(call.seat_index, 2);
        assert_eq!(call.hold_until, Some(1500));

        let call = parse(r#"{"id":"c3","from_agent_id":"a1","decision":"pending","action":"speak"}"#);
        assert_eq!(call.decision, None);
        assert_eq!(call.action, CallAction::Speak);

        let call = parse(r#"{"id":"c4","from_agent_id":"a1","decision":"approve"}"#);
        assert_eq!(call.decision, Some(MeetingDecision::Approved));
    }

    #[test]
    fn partial_presence_row_does_not_reject_the_list() {
        let rows: Vec<MeetingPresenceRow> = serde_json::from_str(
            r#"[{"agent_id":"a1","seat_index":"3","until":9000},
                {"agent_id":"a2","decision":"maybe"}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].seat_index, 3);
        assert_eq!(rows[0].until, 9000);
        assert_eq!(rows[1].until, 0);
        assert_eq!(rows[1].decision, None);
    }

    #[test]
    fn unknown_status_and_phase_do_not_reject() {
        let agent: Agent =
            serde_json::from_str(r#"{"id":"a","status":"meditating"}"#).unwrap();
        assert_eq!(agent.status, AgentStatus::Unknown);
        let row: MeetingPresenceRow =
            serde_json::from_str(r#"{"agent_id":"a","phase":"wrapup","until":5}"#).unwrap();
        assert_eq!(row.phase, MeetingPhase::Review);
        assert_eq!(row.seat_index, 0);
    }

    #[test]
    fn snapshot_accepts_camel_and_snake_sub_agents() {
        let a: OfficeSnapshot =
            serde_json::from_str(r#"{"subAgents":[{"id":"s","parent_agent_id":"p"}]}"#).unwrap();
        let b: OfficeSnapshot =
            serde_json::from_str(r#"{"sub_agents":[{"id":"s","parent_agent_id":"p"}]}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sub_agents.len(), 1);
    }

    #[test]
    fn cli_usage_peak_ignores_nan() {
        let usage: CliUsage = serde_json::from_str(
            r#"{"claude":[{"label":"5h","utilization":0.4},{"label":"7d","utilization":0.9}]}"#,
        )
        .unwrap();
        assert_eq!(usage.peak("claude"), Some(0.9));
        assert_eq!(usage.peak("codex"), None);
    }

    #[test]
    fn display_name_falls_back() {
        let d = Department {
            id: "dev".into(),
            name: "Development".into(),
            localized_names: BTreeMap::from([("ko".to_string(), "개발팀".to_string())]),
            icon: String::new(),
            theme: None,
            sort_order: 0,
        };
        assert_eq!(d.display_name("ko"), "개발팀");
        assert_eq!(d.display_name("ja"), "Development");
    }
}
