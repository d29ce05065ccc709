//! Cluster lifecycle state machine.
//!
//! The machine is an explicit `(state, event) -> (target, action)` table.
//! After a transition's action runs, the target's auto-transition (if any)
//! fires within the same dispatch. Any event without a table entry is a
//! no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    Initial,
    Running,
    Allocating,
    Stopping,
    Stopped,
    Destroying,
    /// Terminal: projection unregistered and spec released.
    Destroyed,
    /// Terminal: the controller has dropped the cluster.
    Final,
}

impl ClusterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClusterState::Destroyed | ClusterState::Final)
    }

    /// State a transient state settles into once its action completes.
    pub fn auto_transition(&self) -> Option<ClusterState> {
        match self {
            ClusterState::Allocating => Some(ClusterState::Running),
            ClusterState::Stopping => Some(ClusterState::Stopped),
            ClusterState::Destroying => Some(ClusterState::Destroyed),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterState::Initial => "INITIAL",
            ClusterState::Running => "RUNNING",
            ClusterState::Allocating => "ALLOCATING",
            ClusterState::Stopping => "STOPPING",
            ClusterState::Stopped => "STOPPED",
            ClusterState::Destroying => "DESTROYING",
            ClusterState::Destroyed => "DESTROYED",
            ClusterState::Final => "FINAL",
        };
        f.write_str(name)
    }
}

/// Events a cluster can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterEvent {
    Start,
    Configure,
    Stop,
    Destroy,
}

/// Side effect attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAction {
    /// Register the projection with the router.
    Start,
    /// Apply an optional new spec, diff, request allocation, queue evictions.
    Allocate,
    /// Stop accepting members and queue every held member for eviction.
    Stop,
    /// Accept members again after a stop.
    Resume,
    /// Unregister the projection and release its spec.
    Destroy,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target: ClusterState,
    pub action: ClusterAction,
}

static TRANSITIONS: LazyLock<HashMap<(ClusterState, ClusterEvent), Transition>> =
    LazyLock::new(|| {
        use ClusterAction as A;
        use ClusterEvent as E;
        use ClusterState as S;

        [
            (S::Initial, E::Start, S::Running, A::Start),
            (S::Running, E::Configure, S::Allocating, A::Allocate),
            (S::Stopped, E::Start, S::Running, A::Resume),
            (S::Running, E::Stop, S::Stopping, A::Stop),
            (S::Stopped, E::Destroy, S::Destroying, A::Destroy),
            (S::Initial, E::Destroy, S::Destroying, A::Destroy),
        ]
        .into_iter()
        .map(|(from, event, target, action)| ((from, event), Transition { target, action }))
        .collect()
    });

/// Per-cluster state holder.
///
/// The machine itself runs no actions; [`Cluster`](crate::Cluster) looks up
/// the transition, runs its action, then settles the state.
#[derive(Debug, Clone)]
pub struct ClusterFsm {
    state: ClusterState,
}

impl Default for ClusterFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterFsm {
    pub fn new() -> Self {
        Self {
            state: ClusterState::Initial,
        }
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    /// Table entry for `event` in the current state.
    pub fn transition(&self, event: ClusterEvent) -> Option<Transition> {
        TRANSITIONS.get(&(self.state, event)).copied()
    }

    /// Enter `target` ahead of running the transition's action.
    pub fn enter(&mut self, target: ClusterState) {
        self.state = target;
    }

    /// Follow the current state's auto-transition, if it has one.
    pub fn settle(&mut self) -> ClusterState {
        if let Some(next) = self.state.auto_transition() {
            self.state = next;
        }
        self.state
    }

    /// Move a destroyed machine into FINAL. Returns false in any other state.
    pub fn finish(&mut self) -> bool {
        if self.state != ClusterState::Destroyed {
            return false;
        }
        self.state = ClusterState::Final;
        true
    }
}
