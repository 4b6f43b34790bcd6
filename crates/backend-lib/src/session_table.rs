// ============================
// crates/backend-lib/src/session_table.rs
// ============================
//! Authoritative session membership.
//!
//! A session exists exactly while it has at least one member: it is created by
//! the first join and removed by the leave that empties it.
use sketch_common::{ConnectionId, ProjectId};
use std::collections::{HashMap, HashSet};

/// Result of removing a connection from a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The connection left and `remaining` members are still in the session
    Left { remaining: usize },
    /// The connection was the last member; the session no longer exists
    SessionGone,
    /// The connection was not a member; `size` is the unchanged member count
    NotMember { size: usize },
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ProjectId, HashSet<ConnectionId>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, creating the session if needed. Returns the new size;
    /// joining twice does not count twice.
    pub fn join(&mut self, project_id: &str, connection: ConnectionId) -> usize {
        let members = self.sessions.entry(project_id.to_string()).or_default();
        members.insert(connection);
        members.len()
    }

    pub fn leave(&mut self, project_id: &str, connection: ConnectionId) -> Departure {
        let Some(members) = self.sessions.get_mut(project_id) else {
            return Departure::NotMember { size: 0 };
        };

        if !members.remove(&connection) {
            return Departure::NotMember {
                size: members.len(),
            };
        }

        if members.is_empty() {
            self.sessions.remove(project_id);
            Departure::SessionGone
        } else {
            Departure::Left {
                remaining: members.len(),
            }
        }
    }

    /// Fan-out set for an event sent by `connection`
    pub fn members_except(&self, project_id: &str, connection: ConnectionId) -> Vec<ConnectionId> {
        self.sessions
            .get(project_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| **member != connection)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn members(&self, project_id: &str) -> Vec<ConnectionId> {
        self.sessions
            .get(project_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, project_id: &str, connection: ConnectionId) -> bool {
        self.sessions
            .get(project_id)
            .is_some_and(|members| members.contains(&connection))
    }

    /// Member count, `0` for a session that does not exist
    pub fn size(&self, project_id: &str) -> usize {
        self.sessions.get(project_id).map_or(0, HashSet::len)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
