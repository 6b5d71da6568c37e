//! Mesh supervisor: the one-shot mesh-ready barrier that gates DKG start
//! (§4.5).

use crate::types::{DeviceId, MeshStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshReady {
    pub session_id: String,
    pub device_id: DeviceId,
}

pub struct MeshSupervisor {
    self_id: DeviceId,
    status: MeshStatus,
    /// Reset only on explicit session reset (§4.5).
    own_ready_sent: bool,
    participants: Vec<DeviceId>,
}

impl MeshSupervisor {
    pub fn new(self_id: DeviceId) -> Self {
        Self {
            self_id,
            status: MeshStatus::Incomplete,
            own_ready_sent: false,
            participants: Vec::new(),
        }
    }

    pub fn status(&self) -> &MeshStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, MeshStatus::Ready)
    }

    /// Called once the session's participant list is known. Evaluates
    /// condition (a)+(b) of §4.5 given the current connectivity view and
    /// emits this device's own `MeshReady` at most once.
    ///
    /// Returns `Some(MeshReady)` the first time both conditions hold;
    /// `None` on every subsequent call (idempotent).
    pub fn maybe_emit_own_ready(
        &mut self,
        session_id: &str,
        participants: &[DeviceId],
        all_accepted: bool,
        all_channels_usable: impl Fn(&DeviceId) -> bool,
    ) -> Option<MeshReady> {
        self.participants = participants.to_vec();

        if self.own_ready_sent {
            return None;
        }
        if !all_accepted {
            return None;
        }
        let others_ready = participants
            .iter()
            .filter(|p| **p != self.self_id)
            .all(|p| all_channels_usable(p));
        if !others_ready {
            return None;
        }

        self.own_ready_sent = true;
        self.note_ready(self.self_id.clone());
        Some(MeshReady {
            session_id: session_id.to_string(),
            device_id: self.self_id.clone(),
        })
    }

    /// Folds in an inbound `MeshReady`. Idempotent: a duplicate from the
    /// same peer does not change the `ready` set size (§8).
    pub fn handle_mesh_ready(&mut self, from: DeviceId) {
        self.note_ready(from);
    }

    fn note_ready(&mut self, device: DeviceId) {
        let total = self.participants.len();
        let mut ready = match &self.status {
            MeshStatus::PartiallyReady { ready, .. } => ready.clone(),
            MeshStatus::Ready => return,
            MeshStatus::Incomplete => BTreeSet::new(),
        };
        ready.insert(device);

        self.status = if total > 0 && ready.len() == total {
            MeshStatus::Ready
        } else {
            MeshStatus::PartiallyReady { ready, total }
        };
    }

    /// A peer disconnecting removes it from `ready` and drops `Ready`
    /// back to `PartiallyReady`; a later reconnect needs a fresh
    /// `MeshReady` exchange from that peer (§4.5).
    pub fn handle_disconnect(&mut self, peer: &DeviceId) {
        let total = self.participants.len();
        let mut ready = match &self.status {
            MeshStatus::PartiallyReady { ready, .. } => ready.clone(),
            MeshStatus::Ready => self.participants.iter().cloned().collect(),
            MeshStatus::Incomplete => return,
        };
        ready.remove(peer);
        self.status = MeshStatus::PartiallyReady { ready, total };
    }

    /// Resets the barrier for a fresh session.
    pub fn reset(&mut self) {
        self.status = MeshStatus::Incomplete;
        self.own_ready_sent = false;
        self.participants.clear();
    }
}
