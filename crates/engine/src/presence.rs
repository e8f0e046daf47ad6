//! Converges held meeting actors onto an authoritative occupant listing.
//!
//! The event stream can miss calls (reconnects, reloads). The presence
//! snapshot is the fallback truth: rows that are still live get a seated
//! actor, seated actors without a row go away. Actors still walking to the
//! table are left alone; the event that spawned them owns them.

use std::collections::BTreeMap;

use bureau_protocol::MeetingPresenceRow;
use tracing::debug;

use crate::delivery::{DeliveryManager, Stage, Target};
use crate::resources::ResourceArena;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Rows still in effect at `now_ms`, one per agent (later rows win).
pub fn live_rows(rows: &[MeetingPresenceRow], now_ms: i64) -> BTreeMap<&str, &MeetingPresenceRow> {
    rows.iter()
        .filter(|r| r.until > now_ms && !r.agent_id.is_empty())
        .map(|r| (r.agent_id.as_str(), r))
        .collect()
}

pub fn reconcile(
    manager: &mut DeliveryManager,
    rows: &[MeetingPresenceRow],
    stage: &Stage<'_>,
    arena: &mut ResourceArena,
    now_ms: i64,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    if stage.seats.is_empty() {
        return report;
    }
    let live = live_rows(rows, now_ms);

    for (agent_id, row) in &live {
        let Some((seat_index, seat)) = stage.seat(row.seat_index) else {
            continue;
        };
        match manager.held_for_mut(agent_id) {
            Some(actor) => {
                let mut changed = false;
                if let Some(hold) = actor.hold.as_mut() {
                    if hold.seat_index != seat_index {
                        hold.seat_index = seat_index;
                        changed = true;
                    }
                    if hold.hold_until_ms != row.until {
                        hold.hold_until_ms = row.until;
                        changed = true;
                    }
                }
                if actor.destination != seat {
                    actor.destination = seat;
                    actor.target = Target::Seat;
                    changed = true;
                }
                if actor.has_arrived() && actor.position != seat {
                    actor.origin = seat;
                    actor.position = seat;
                    changed = true;
                }
                if let Some(decision) = row.decision {
                    if actor.decision != Some(decision) {
                        actor.decision = Some(decision);
                        changed = true;
                    }
                }
                if row.task_id.is_some() && actor.task_id != row.task_id {
                    actor.task_id = row.task_id.clone();
                    changed = true;
                }
                if changed {
                    report.updated += 1;
                }
            }
            None => {
                manager.insert_seated(
                    arena,
                    agent_id,
                    (seat_index, seat),
                    row.until,
                    row.decision.unwrap_or_else(|| row.phase.default_decision()),
                    row.task_id.clone(),
                );
                report.created += 1;
            }
        }
    }

    let absent: Vec<String> = manager
        .held()
        .filter(|a| a.has_arrived() && !live.contains_key(a.agent_id.as_str()))
        .map(|a| a.id.clone())
        .collect();
    for id in absent {
        if manager.destroy(&id, arena) {
            report.removed += 1;
        }
    }

    if !report.is_noop() {
        debug!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            "meeting presence reconciled"
        );
    }
    report
}
