use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use bureau_engine::{now_ms, EngineConfig, Lifecycle, OfficeScene, RefreshCoalescer};
use bureau_protocol::{
    targets, CliUsage, InputCommand, MeetingPresenceRow, OfficeSnapshot, Patch, PushEvent,
    SceneFrame, SceneNotification, SceneSettings, Swap, UiUpdate,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

pub mod runtime;
pub mod store;

use store::Store;

/// Last store revision the scene has applied, per input kind.
#[derive(Debug, Default)]
pub struct SyncRevs {
    pub snapshot: AtomicI64,
    pub presence: AtomicI64,
    pub cli_usage: AtomicI64,
}

pub struct AppState {
    pub store: Store,
    pub config: EngineConfig,
    pub revs: SyncRevs,
    scene: Mutex<OfficeScene>,
    coalescer: Mutex<RefreshCoalescer>,
}

impl AppState {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        let config = config.normalized();
        Self {
            coalescer: Mutex::new(RefreshCoalescer::new(config.poll.coalesce_debounce_ms)),
            scene: Mutex::new(OfficeScene::new(config.clone())),
            revs: SyncRevs::default(),
            store,
            config,
        }
    }

    /// Lock the scene. A poisoned lock still hands out the state: a panic in
    /// one frame should not freeze the view.
    pub fn scene(&self) -> MutexGuard<'_, OfficeScene> {
        self.scene.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn coalescer(&self) -> MutexGuard<'_, RefreshCoalescer> {
        self.coalescer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.scene().lifecycle() == Lifecycle::Running
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/office/snapshot", put(put_snapshot))
        .route("/api/office/presence", put(put_presence))
        .route("/api/office/cli-usage", put(put_cli_usage))
        .route("/api/events", post(post_event))
        .route("/api/input", post(post_input))
        .route("/api/visibility", post(post_visibility))
        .route("/api/settings", put(put_settings))
        .route("/api/scene/frame", get(scene_frame))
        .route("/api/notifications", get(notifications))
        .with_state(state)
        // Frames and notifications are live; never let a browser cache them.
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // The scene exposes live org state. Never use `Access-Control-Allow-Origin: *` here;
        // it lets any website open in the browser read it.
        .layer(local_only_cors())
}

pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        let body = Json(serde_json::json!({ "error": format!("{:#}", self.0) }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> &'static str {
    "ok"
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn put_snapshot(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<OfficeSnapshot>,
) -> ApiResult<Json<serde_json::Value>> {
    let rev = state.store.put_snapshot(&snapshot)?;
    state.coalescer().request(now_ms());
    Ok(Json(serde_json::json!({ "rev": rev })))
}

async fn put_presence(
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<MeetingPresenceRow>>,
) -> ApiResult<Json<serde_json::Value>> {
    let rev = state.store.put_presence(&rows)?;
    Ok(Json(serde_json::json!({ "rev": rev })))
}

async fn put_cli_usage(
    State(state): State<Arc<AppState>>,
    Json(usage): Json<CliUsage>,
) -> ApiResult<Json<serde_json::Value>> {
    let rev = state.store.put_cli_usage(&usage)?;
    Ok(Json(serde_json::json!({ "rev": rev })))
}

fn event_meta(event: &PushEvent) -> (&'static str, Option<&str>) {
    match event {
        PushEvent::TaskUpdate(_) => ("push.task_update", None),
        PushEvent::AgentStatus(_) => ("push.agent_status", None),
        PushEvent::SubtaskUpdate(_) => ("push.subtask_update", None),
        PushEvent::CrossDeptDelivery(ev) => ("push.cross_dept_delivery", Some(ev.id.as_str())),
        PushEvent::CeoOfficeCall(call) => ("push.ceo_office_call", Some(call.id.as_str())),
    }
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PushEvent>,
) -> ApiResult<Json<serde_json::Value>> {
    let (kind, id) = event_meta(&event);
    state
        .store
        .log_event(kind, id, serde_json::to_value(&event)?)?;

    let now = now_ms();
    let (refresh, deferred) = {
        let mut scene = state.scene();
        let refresh = scene.enqueue_event(event, now);
        (refresh, scene.inbox_len())
    };
    if refresh {
        state.coalescer().request(now);
    }
    Ok(Json(serde_json::json!({ "refresh": refresh, "deferred": deferred })))
}

async fn post_input(
    State(state): State<Arc<AppState>>,
    Json(cmd): Json<InputCommand>,
) -> StatusCode {
    state.scene().handle_input(cmd, now_ms());
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct VisibilityInput {
    visible: bool,
}

fn lifecycle_name(l: Lifecycle) -> &'static str {
    match l {
        Lifecycle::Idle => "idle",
        Lifecycle::Running => "running",
        Lifecycle::Paused => "paused",
        Lifecycle::Stopped => "stopped",
    }
}

async fn post_visibility(
    State(state): State<Arc<AppState>>,
    Json(input): Json<VisibilityInput>,
) -> Json<serde_json::Value> {
    let lifecycle = {
        let mut scene = state.scene();
        scene.set_visible(input.visible);
        scene.lifecycle()
    };
    Json(serde_json::json!({ "lifecycle": lifecycle_name(lifecycle) }))
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SceneSettings>,
) -> StatusCode {
    state.scene().apply_settings(settings, now_ms());
    StatusCode::NO_CONTENT
}

async fn scene_frame(State(state): State<Arc<AppState>>) -> Json<SceneFrame> {
    Json(state.scene().frame())
}

async fn notifications(State(state): State<Arc<AppState>>) -> Json<Vec<UiUpdate>> {
    let mut scene = state.scene();
    let notes = scene.drain_notifications();
    Json(notes.iter().map(|n| render_notification(n, &scene)).collect())
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

fn card(title: &str, lines: &[String]) -> String {
    let mut html = format!(
        "<div class=\"card\"><strong>{}</strong>",
        html_escape::encode_text(title)
    );
    for line in lines {
        html.push_str(&format!("<div>{}</div>", html_escape::encode_text(line)));
    }
    html.push_str("</div>");
    html
}

fn render_notification(note: &SceneNotification, scene: &OfficeScene) -> UiUpdate {
    let payload = serde_json::to_value(note).unwrap_or(serde_json::Value::Null);
    let patches = match note {
        SceneNotification::SelectAgent { agent_id } => {
            let (title, lines) = match scene.registry().get(agent_id) {
                Some(actor) => (
                    actor.name.clone(),
                    vec![
                        format!("status: {:?}", actor.status).to_lowercase(),
                        format!(
                            "task: {}",
                            actor.task_title.as_deref().unwrap_or("none")
                        ),
                    ],
                ),
                None => (agent_id.clone(), vec!["not on the floor".to_string()]),
            };
            vec![Patch {
                target: targets::PANEL_AGENT.to_string(),
                swap: Swap::Replace,
                html: Some(card(&title, &lines)),
                payload: None,
                trigger: None,
            }]
        }
        SceneNotification::SelectDepartment { department_id } => {
            let room = scene
                .layout()
                .rooms
                .iter()
                .find(|r| &r.department_id == department_id);
            let title = room.map(|r| r.label.as_str()).unwrap_or(department_id.as_str());
            let seated = scene
                .layout()
                .desks
                .iter()
                .filter(|d| &d.department_id == department_id)
                .count();
            vec![Patch {
                target: targets::PANEL_DEPARTMENT.to_string(),
                swap: Swap::Replace,
                html: Some(card(title, &[format!("{seated} at desks")])),
                payload: None,
                trigger: None,
            }]
        }
        SceneNotification::OpenMeetingMinutes { task_id } => vec![Patch {
            target: targets::PANEL_MEETING_MINUTES.to_string(),
            swap: Swap::Replace,
            html: None,
            payload: Some(serde_json::json!({ "task_id": task_id })),
            trigger: Some("minutes:open".to_string()),
        }],
        SceneNotification::CrossDeptDeliveryProcessed { id }
        | SceneNotification::CeoOfficeCallProcessed { id } => vec![Patch {
            target: targets::EVENT_QUEUE.to_string(),
            swap: Swap::Merge,
            html: None,
            payload: Some(serde_json::json!({ "dequeue": id, "at": now_rfc3339() })),
            trigger: None,
        }],
    };
    UiUpdate::new(note.event_name(), patches).with_payload(payload)
}

pub async fn serve(addr: SocketAddr, store: Store, config: EngineConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, store, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    store: Store,
    config: EngineConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    // Fail fast if sqlite is unavailable.
    store.open()?;
    let state = Arc::new(AppState::new(store, config));
    state.scene().start();
    runtime::sync_snapshot(&state)?;
    runtime::sync_presence(&state)?;
    runtime::sync_cli_usage(&state)?;

    let rt = runtime::Runtime::spawn(state.clone());
    let app = build_router(state.clone());
    let addr = listener.local_addr()?;
    info!(%addr, "scene server listening");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    rt.shutdown(&state).await;
    served?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}

const DASHBOARD_HTML: &str = r###"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Bureau</title>
  <style>
    :root{--bg:#0f1420;--panel:#161d2c;--edge:#2b3a55;--ink:#e8eef8;--muted:#8a9bb5;--ok:#4df5bf}
    *{box-sizing:border-box;margin:0;padding:0}
    html,body{width:100%;height:100%;background:var(--bg);color:var(--ink);font-family:Inter,system-ui,sans-serif}
    .layout{display:grid;grid-template-columns:1fr 280px;height:100vh}
    .viewport{position:relative;overflow:hidden}
    #scene{display:block}
    .dock{border-left:1px solid var(--edge);background:var(--panel);padding:12px;display:flex;flex-direction:column;gap:10px;overflow:auto}
    .card{border:1px solid var(--edge);border-radius:10px;padding:10px;font-size:13px}
    .card strong{display:block;margin-bottom:4px}
    .pad{position:absolute;right:16px;bottom:16px;display:none;grid-template-columns:repeat(3,44px);gap:6px}
    .pad button{height:44px;border-radius:10px;border:1px solid var(--edge);background:#1f2a40;color:var(--ink);font-size:18px}
    @media (max-width: 820px){.layout{grid-template-columns:1fr}.dock{display:none}.pad{display:grid}}
  </style>
</head>
<body>
  <div class="layout">
    <div class="viewport" id="viewport">
      <canvas id="scene"></canvas>
      <div class="pad">
        <span></span><button data-b="up">▲</button><span></span>
        <button data-b="left">◀</button><button data-b="interact">●</button><button data-b="right">▶</button>
        <span></span><button data-b="down">▼</button><span></span>
      </div>
    </div>
    <div class="dock">
      <div id="panel.agent" class="card"><strong>Agent</strong><div>Click an agent.</div></div>
      <div id="panel.department" class="card"><strong>Department</strong><div>Walk into a room and press E.</div></div>
      <div id="panel.meeting_minutes" class="card"><strong>Meeting</strong><div>-</div></div>
    </div>
  </div>
  <script>
  (function(){
    const canvas = document.getElementById("scene");
    const viewport = document.getElementById("viewport");
    const ctx = canvas.getContext("2d");
    let frame = null;

    function send(path, body){
      return fetch(path, { method: "POST", headers: { "content-type": "application/json" }, body: JSON.stringify(body) });
    }

    function resize(){
      const r = viewport.getBoundingClientRect();
      canvas.width = r.width; canvas.height = r.height;
      send("/api/input", { kind: "viewport", width: r.width, height: r.height });
      send("/api/input", { kind: "canvas_width", width: r.width });
    }

    const keys = { ArrowUp: "up", ArrowDown: "down", ArrowLeft: "left", ArrowRight: "right", w: "up", s: "down", a: "left", d: "right" };
    addEventListener("keydown", (e) => {
      if (e.repeat) return;
      if (keys[e.key]) send("/api/input", { kind: "key_down", direction: keys[e.key] });
      if (e.key === "e" || e.key === " ") send("/api/input", { kind: "interact" });
    });
    addEventListener("keyup", (e) => { if (keys[e.key]) send("/api/input", { kind: "key_up", direction: keys[e.key] }); });
    for (const b of document.querySelectorAll(".pad button")){
      b.addEventListener("pointerdown", () => send("/api/input", { kind: "pad_press", button: b.dataset.b }));
      b.addEventListener("pointerup", () => send("/api/input", { kind: "pad_release", button: b.dataset.b }));
    }
    canvas.addEventListener("click", (e) => {
      if (!frame) return;
      const r = canvas.getBoundingClientRect();
      send("/api/input", { kind: "pick", x: e.clientX - r.left + frame.camera.x, y: e.clientY - r.top + frame.camera.y });
    });
    document.addEventListener("visibilitychange", () => send("/api/visibility", { visible: !document.hidden }));

    function glyph(a){ return a.kind === "glyph" ? a.text : "🧑"; }

    function draw(){
      if (!frame) return;
      ctx.setTransform(1,0,0,1,0,0);
      ctx.fillStyle = "#0f1420"; ctx.fillRect(0,0,canvas.width,canvas.height);
      ctx.translate(-frame.camera.x, -frame.camera.y);
      for (const z of frame.zones){
        ctx.fillStyle = z.highlighted ? "#24324d" : "#1a2436";
        ctx.fillRect(z.rect.x, z.rect.y, z.rect.w, z.rect.h);
      }
      for (const r of frame.rooms){
        ctx.fillStyle = r.theme.floor1 || "#1d2a3f";
        ctx.fillRect(r.rect.x, r.rect.y, r.rect.w, r.rect.h);
        ctx.strokeStyle = r.highlighted ? "#ffd06b" : (r.theme.accent || "#2b3a55");
        ctx.lineWidth = r.highlighted ? 3 : 1;
        ctx.strokeRect(r.rect.x, r.rect.y, r.rect.w, r.rect.h);
        ctx.fillStyle = "#e8eef8"; ctx.font = "13px system-ui";
        ctx.fillText(`${r.icon} ${r.label}`, r.rect.x + 10, r.rect.y + 20);
        if (r.empty){ ctx.fillStyle = "#8a9bb5"; ctx.fillText("empty", r.rect.x + 10, r.rect.y + 44); }
      }
      ctx.fillStyle = "#394a68";
      for (const d of frame.desks) ctx.fillRect(d.rect.x, d.rect.y, d.rect.w, d.rect.h);
      ctx.font = "16px system-ui";
      for (const f of frame.furniture) ctx.fillText({ceo_desk:"🗄",meeting_table:"🟫",wall_clock:"🕒",plant:"🪴",coffee_machine:"☕",sofa:"🛋"}[f.kind] || "▪", f.position.x - 8, f.position.y + 6);
      ctx.font = "22px system-ui";
      for (const a of frame.agents){
        ctx.globalAlpha = a.pose === "away" ? 0.4 : 1;
        ctx.fillText(glyph(a.appearance), a.position.x - 11, a.position.y + 8);
        if (a.stress !== "normal"){ ctx.fillStyle = {sweat:"#ffd06b",stressed:"#ff7198",collapsed:"#8a9bb5"}[a.stress]; ctx.fillRect(a.position.x - 10, a.position.y + 12, 20, 3); ctx.fillStyle = "#e8eef8"; }
      }
      ctx.globalAlpha = 1;
      ctx.font = "12px system-ui";
      for (const h of frame.helpers) ctx.fillText("🤖", h.position.x - 6, h.position.y + 4);
      ctx.font = "20px system-ui";
      for (const d of frame.deliveries){
        ctx.globalAlpha = d.alpha;
        ctx.save();
        if (d.facing === "left"){ ctx.translate(d.position.x, 0); ctx.scale(-1, 1); ctx.translate(-d.position.x, 0); }
        ctx.fillText(d.kind === "handoff" ? "📄" : glyph(d.appearance), d.position.x - 10, d.position.y + 7);
        ctx.restore();
        if (d.decision){ ctx.font = "10px system-ui"; ctx.fillText(d.decision, d.position.x - 16, d.position.y - 14); ctx.font = "20px system-ui"; }
      }
      for (const p of frame.particles){
        ctx.globalAlpha = p.alpha;
        ctx.fillStyle = {spark:"#6ff8ff",sweat:"#68c7ff",sleep:"#e8eef8",steam:"#c9d4e5"}[p.kind];
        if (p.kind === "sleep"){ ctx.font = "10px system-ui"; ctx.fillText("z", p.position.x, p.position.y); }
        else { ctx.fillRect(p.position.x, p.position.y, 2, 2); }
      }
      ctx.globalAlpha = 1;
      ctx.font = "12px system-ui";
      for (const b of frame.bubbles){
        const w = ctx.measureText(b.text).width + 12;
        ctx.fillStyle = "#e8eef8"; ctx.fillRect(b.position.x - w/2, b.position.y - 16, w, 20);
        ctx.fillStyle = "#0f1420"; ctx.fillText(b.text, b.position.x - w/2 + 6, b.position.y - 2);
      }
      ctx.fillStyle = "#ffd06b";
      ctx.beginPath(); ctx.arc(frame.avatar.x, frame.avatar.y, 9, 0, Math.PI * 2); ctx.fill();
    }

    async function frameLoop(){
      for(;;){
        try{
          const r = await fetch("/api/scene/frame", { cache: "no-store" });
          frame = await r.json();
          draw();
        }catch(_e){}
        await new Promise(res => setTimeout(res, 50));
      }
    }

    async function notificationLoop(){
      for(;;){
        try{
          const r = await fetch("/api/notifications", { cache: "no-store" });
          for (const u of await r.json()){
            for (const p of u.patches){
              const t = document.getElementById(p.target);
              if (t && p.html) t.innerHTML = p.html;
              if (t && p.payload && p.payload.task_id) t.innerHTML = `<strong>Meeting</strong><div>minutes for ${p.payload.task_id}</div>`;
            }
          }
        }catch(_e){}
        await new Promise(res => setTimeout(res, 400));
      }
    }

    addEventListener("resize", resize);
    resize();
    frameLoop();
    notificationLoop();
  })();
  </script>
</body>
</html>
"###;
