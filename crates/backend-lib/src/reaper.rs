// ============================
// crates/backend-lib/src/reaper.rs
// ============================
//! Disconnect reaper: tears down every membership of a lost connection.
use crate::metrics::SESSION_REAPED;
use crate::presence;
use crate::registry::ConnectionRegistry;
use crate::router::EventRouter;
use crate::session_table::{Departure, SessionTable};
use metrics::counter;
use sketch_common::{ConnectionId, ProjectId};
use tracing::{debug, info};

/// Remove `connection` from the registry and from each session it was in,
/// notifying the remaining members session by session.
///
/// Safe to call more than once: a connection that is already gone has no
/// sessions left and the call does nothing.
pub fn reap(
    router: &EventRouter,
    registry: &mut ConnectionRegistry,
    sessions: &mut SessionTable,
    connection: ConnectionId,
) -> Vec<(ProjectId, Departure)> {
    let memberships = registry.unregister(connection);
    if memberships.is_empty() {
        debug!(%connection, "nothing to reap");
        return Vec::new();
    }

    let mut departures = Vec::with_capacity(memberships.len());
    for project_id in memberships {
        let departure = sessions.leave(&project_id, connection);
        presence::announce_leave(router, registry, sessions, &project_id, connection, departure);
        departures.push((project_id, departure));
    }

    counter!(SESSION_REAPED).increment(departures.len() as u64);
    info!(%connection, sessions = departures.len(), "reaped disconnected connection");
    departures
}
