use bureau_engine::config::{EngineConfig, LayoutConfig};
use bureau_engine::layout::{build_layout, LayoutInput};
use bureau_engine::OfficeScene;
use bureau_protocol::{
    CrossDeptDelivery, DeliveryKind, MotionKind, OfficeSnapshot, PushEvent, SceneNotification,
};
use serde_json::json;
use std::collections::BTreeMap;

fn two_departments() -> OfficeSnapshot {
    serde_json::from_value(json!({
        "departments": [
            { "id": "A", "name": "Alpha", "sort_order": 0 },
            { "id": "B", "name": "Beta", "sort_order": 1 }
        ],
        "agents": [
            { "id": "A1", "name": "Ann", "department_id": "A", "status": "working" },
            { "id": "A2", "name": "Abe", "department_id": "A", "status": "idle" },
            { "id": "B1", "name": "Bea", "department_id": "B", "status": "working" }
        ]
    }))
    .unwrap()
}

fn cd1() -> PushEvent {
    PushEvent::CrossDeptDelivery(CrossDeptDelivery {
        id: "cd1".into(),
        from_agent_id: "A1".into(),
        to_agent_id: "B1".into(),
    })
}

#[test]
fn builder_lays_out_two_columns_and_three_anchors() {
    let snapshot = two_departments();
    let layout = build_layout(
        &LayoutInput {
            snapshot: &snapshot,
            canvas_width: 900.0,
            locale: "en",
            theme_overrides: &BTreeMap::new(),
        },
        &LayoutConfig::default(),
    );
    assert_eq!(layout.columns, 2);
    assert_eq!(layout.anchors.len(), 3);
}

#[test]
fn collaboration_walk_is_created_once() {
    let mut cfg = EngineConfig::default();
    cfg.canvas_width = 900.0;
    let mut scene = OfficeScene::new(cfg);
    scene.apply_snapshot(two_departments(), 0);
    scene.start();

    scene.enqueue_event(cd1(), 0);
    assert_eq!(scene.deliveries().len(), 1);
    let actor = scene.deliveries().get("cd1").unwrap();
    assert_eq!(actor.kind, DeliveryKind::Collaboration);
    assert_eq!(actor.motion, MotionKind::Walk);
    assert_eq!(Some(actor.destination), scene.layout().anchor("B1"));

    scene.enqueue_event(cd1(), 16);
    assert_eq!(scene.deliveries().len(), 1);
    assert_eq!(
        scene.drain_notifications(),
        vec![SceneNotification::CrossDeptDeliveryProcessed { id: "cd1".into() }]
    );
}

#[test]
fn walk_survives_rebuilds_and_finishes_cleanly() {
    let mut cfg = EngineConfig::default();
    cfg.canvas_width = 900.0;
    let mut scene = OfficeScene::new(cfg);
    scene.apply_snapshot(two_departments(), 0);
    scene.start();
    scene.enqueue_event(cd1(), 0);

    let baseline = scene.arena().live_count();
    let mut now = 0;
    for round in 0..4 {
        for _ in 0..25 {
            now += 16;
            scene.tick(now);
        }
        // Unrelated domain change: a rebuild mid-walk.
        let mut snap = two_departments();
        snap.agents[1].name = format!("Abe {round}");
        scene.apply_snapshot(snap, now);
        assert_eq!(scene.deliveries().len(), 1, "walk cancelled by rebuild {round}");
        assert_eq!(scene.arena().live_count(), baseline);
    }

    while !scene.deliveries().is_empty() {
        now += 16;
        assert!(scene.tick(now));
        assert!(now < 60_000, "walk never finished");
    }
    assert_eq!(scene.arena().live_count(), baseline - 1);
}
