//! Pair repair
//!
//! Finds active edges whose mirror is missing or not active and brings the
//! pair back to a consistent state. The recipient's edge records consent,
//! so a lone active edge on the recipient's side is completed, while a lone
//! active edge on the requester's side is dropped.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::RequestService;
use crate::error::Result;
use crate::models::{EdgeState, RelationshipEdge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// Mirror created or moved to active
    CompletedMirror,
    /// Lone edge moved back to pending
    RevertedToPending,
    /// Lone edge deleted
    DroppedOrphan,
    /// Pair became consistent before we got to it
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub inspected: usize,
    pub completed: usize,
    pub reverted: usize,
    pub dropped: usize,
}

impl RepairReport {
    pub fn repaired(&self) -> usize {
        self.completed + self.reverted + self.dropped
    }
}

/// Decide how to repair a lone active `edge` given its current mirror
pub fn plan(edge: &RelationshipEdge, mirror: Option<&RelationshipEdge>) -> RepairAction {
    if edge.state != EdgeState::Active {
        return RepairAction::Skipped;
    }

    let mirror_state = mirror.map(|m| m.state);
    if !edge.is_recipient_side() {
        return match mirror_state {
            Some(EdgeState::Active) => RepairAction::Skipped,
            _ => RepairAction::DroppedOrphan,
        };
    }

    match mirror_state {
        Some(EdgeState::Active) => RepairAction::Skipped,
        None | Some(EdgeState::Pending) => RepairAction::CompletedMirror,
        Some(EdgeState::Rejected) => RepairAction::RevertedToPending,
        Some(EdgeState::Blocked) => RepairAction::DroppedOrphan,
    }
}

impl RequestService {
    /// One reconciliation pass over every half-active pair
    pub async fn repair_pairs(&self) -> Result<RepairReport> {
        let lone = self.edges.lone_active_edges().await?;
        let mut report = RepairReport {
            inspected: lone.len(),
            ..RepairReport::default()
        };

        for candidate in lone {
            // Re-read both sides; a request may have raced the scan
            let Some(edge) = self.edges.get_edge(&candidate.id).await? else {
                continue;
            };
            let mirror = self
                .edges
                .find_edge(&edge.peer_user_id, &edge.owner_user_id)
                .await?;

            let action = plan(&edge, mirror.as_ref());
            let applied = match action {
                RepairAction::CompletedMirror => {
                    self.edges.complete_mirror(&edge).await?;
                    true
                }
                RepairAction::RevertedToPending => {
                    self.edges
                        .transition(&edge.id, EdgeState::Active, EdgeState::Pending)
                        .await?
                }
                RepairAction::DroppedOrphan => {
                    self.edges.delete_edge(&edge.id, EdgeState::Active).await?
                }
                RepairAction::Skipped => false,
            };

            if !applied {
                continue;
            }
            match action {
                RepairAction::CompletedMirror => report.completed += 1,
                RepairAction::RevertedToPending => report.reverted += 1,
                RepairAction::DroppedOrphan => report.dropped += 1,
                RepairAction::Skipped => {}
            }
            info!(
                "[Repair] Edge {} ({} -> {}): {:?}",
                edge.id, edge.owner_user_id, edge.peer_user_id, action
            );
        }

        Ok(report)
    }
}

/// Run [`RequestService::repair_pairs`] every `interval` until the task is aborted
pub fn spawn_repair_task(service: Arc<RequestService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.repair_pairs().await {
                Ok(report) if report.repaired() > 0 => {
                    info!("[Repair] Pass complete: {:?}", report);
                }
                Ok(_) => {}
                Err(e) => warn!("[Repair] Pass failed: {}", e),
            }
        }
    })
}
