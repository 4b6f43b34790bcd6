// ============================
// crates/backend-lib/src/presence.rs
// ============================
//! Presence notifications derived from session table transitions.
//! Callers apply the membership change first, then announce it here.
use crate::registry::ConnectionRegistry;
use crate::router::{DeliveryReport, EventRouter};
use crate::session_table::{Departure, SessionTable};
use sketch_common::{ConnectionId, ServerEvent};
use tracing::debug;

/// Announce a completed join.
///
/// The joiner alone gets `member-count`; everyone else gets `user-joined`,
/// unless the join was a repeat that changed nothing.
pub fn announce_join(
    router: &EventRouter,
    registry: &ConnectionRegistry,
    sessions: &SessionTable,
    project_id: &str,
    joiner: ConnectionId,
    member_count: usize,
    fresh: bool,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    if fresh {
        let others = sessions.members_except(project_id, joiner);
        let notice = ServerEvent::UserJoined {
            project_id: project_id.to_string(),
            user_id: joiner,
            member_count,
        };
        let sent = router.deliver(registry, &others, notice);
        report.delivered += sent.delivered;
        report.dropped += sent.dropped;
    }

    let count = ServerEvent::MemberCount {
        project_id: project_id.to_string(),
        member_count,
    };
    let sent = router.deliver(registry, &[joiner], count);
    report.delivered += sent.delivered;
    report.dropped += sent.dropped;

    debug!(connection = %joiner, project = %project_id, member_count, fresh, "announced join");
    report
}

/// Announce a completed departure to whoever is left. An emptied session
/// has nobody to tell.
pub fn announce_leave(
    router: &EventRouter,
    registry: &ConnectionRegistry,
    sessions: &SessionTable,
    project_id: &str,
    leaver: ConnectionId,
    departure: Departure,
) -> DeliveryReport {
    let Departure::Left { remaining } = departure else {
        return DeliveryReport::default();
    };

    let notice = ServerEvent::UserLeft {
        project_id: project_id.to_string(),
        user_id: leaver,
        member_count: remaining,
    };
    let report = router.deliver(registry, &sessions.members(project_id), notice);
    debug!(connection = %leaver, project = %project_id, member_count = remaining, "announced leave");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn member(
        registry: &mut ConnectionRegistry,
        sessions: &mut SessionTable,
        project_id: &str,
    ) -> (ConnectionId, mpsc::Receiver<Arc<ServerEvent>>, usize) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        registry.register(id, tx).unwrap();
        let count = sessions.join(project_id, id);
        registry.record_join(id, project_id).unwrap();
        (id, rx, count)
    }

    #[test]
    fn test_join_notices_use_separate_fan_out_sets() {
        let router = EventRouter::new();
        let mut registry = ConnectionRegistry::new();
        let mut sessions = SessionTable::new();
        let (_a, mut a_rx, _) = member(&mut registry, &mut sessions, "p");
        let (b, mut b_rx, count) = member(&mut registry, &mut sessions, "p");

        let report = announce_join(&router, &registry, &sessions, "p", b, count, true);
        assert_eq!(report.delivered, 2);

        assert_eq!(
            *a_rx.try_recv().unwrap(),
            ServerEvent::UserJoined {
                project_id: "p".to_string(),
                user_id: b,
                member_count: 2,
            }
        );
        assert_eq!(
            *b_rx.try_recv().unwrap(),
            ServerEvent::MemberCount {
                project_id: "p".to_string(),
                member_count: 2,
            }
        );
        // No self-addressed join notice
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_repeat_join_only_refreshes_joiner_count() {
        let router = EventRouter::new();
        let mut registry = ConnectionRegistry::new();
        let mut sessions = SessionTable::new();
        let (_a, mut a_rx, _) = member(&mut registry, &mut sessions, "p");
        let (b, mut b_rx, count) = member(&mut registry, &mut sessions, "p");

        announce_join(&router, &registry, &sessions, "p", b, count, false);

        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.try_recv().unwrap().member_count(), Some(2));
    }

    #[test]
    fn test_leave_notice_goes_to_remaining_members() {
        let router = EventRouter::new();
        let mut registry = ConnectionRegistry::new();
        let mut sessions = SessionTable::new();
        let (_a, mut a_rx, _) = member(&mut registry, &mut sessions, "p");
        let (b, mut b_rx, _) = member(&mut registry, &mut sessions, "p");

        let departure = sessions.leave("p", b);
        registry.record_leave(b, "p");
        announce_leave(&router, &registry, &sessions, "p", b, departure);

        assert_eq!(
            *a_rx.try_recv().unwrap(),
            ServerEvent::UserLeft {
                project_id: "p".to_string(),
                user_id: b,
                member_count: 1,
            }
        );
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_no_notice_when_session_emptied_or_not_member() {
        let router = EventRouter::new();
        let mut registry = ConnectionRegistry::new();
        let mut sessions = SessionTable::new();
        let (a, _a_rx, _) = member(&mut registry, &mut sessions, "p");

        let gone = sessions.leave("p", a);
        assert_eq!(gone, Departure::SessionGone);
        let report = announce_leave(&router, &registry, &sessions, "p", a, gone);
        assert_eq!(report.recipients(), 0);

        let report = announce_leave(
            &router,
            &registry,
            &sessions,
            "p",
            a,
            Departure::NotMember { size: 0 },
        );
        assert_eq!(report.recipients(), 0);
    }
}
