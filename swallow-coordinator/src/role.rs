//! The coordinator's role flag.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use swallow_core::Role;

/// Atomic holder for the current [`Role`]. Only the coordinator task writes it.
#[derive(Debug)]
pub(crate) struct RoleCell {
    role: AtomicU8,
}

impl RoleCell {
    pub(crate) fn new() -> Self {
        Self {
            role: AtomicU8::new(encode(Role::Idle)),
        }
    }

    pub(crate) fn get(&self) -> Role {
        decode(self.role.load(Ordering::Acquire))
    }

    /// Store a new role and return the previous one.
    pub(crate) fn set(&self, role: Role) -> Role {
        decode(self.role.swap(encode(role), Ordering::AcqRel))
    }
}

/// Read-only view of a coordinator's role, safe to share across tasks.
#[derive(Debug, Clone)]
pub struct RoleHandle {
    cell: Arc<RoleCell>,
}

impl RoleHandle {
    pub(crate) fn new(cell: Arc<RoleCell>) -> Self {
        Self { cell }
    }

    pub fn get(&self) -> Role {
        self.cell.get()
    }

    pub fn is_leader(&self) -> bool {
        self.get() == Role::Leader
    }
}

fn encode(role: Role) -> u8 {
    match role {
        Role::Idle => 0,
        Role::Leader => 1,
        Role::Follower => 2,
        Role::Terminated => 3,
    }
}

fn decode(raw: u8) -> Role {
    match raw {
        0 => Role::Idle,
        1 => Role::Leader,
        2 => Role::Follower,
        _ => Role::Terminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_observes_coordinator_writes() {
        let cell = Arc::new(RoleCell::new());
        let handle = RoleHandle::new(Arc::clone(&cell));
        assert_eq!(handle.get(), Role::Idle);

        assert_eq!(cell.set(Role::Follower), Role::Idle);
        assert_eq!(cell.set(Role::Leader), Role::Follower);
        assert!(handle.clone().is_leader());

        cell.set(Role::Terminated);
        assert_eq!(handle.get(), Role::Terminated);
    }
}
