// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_MALFORMED: &str = "ws.malformed";
pub const SESSION_JOINED: &str = "session.joined";
pub const SESSION_LEFT: &str = "session.left";
pub const SESSION_ACTIVE: &str = "session.active";
pub const SESSION_REAPED: &str = "session.reaped";
pub const EVENT_RELAYED: &str = "event.relayed";
pub const EVENT_DROPPED: &str = "event.dropped";
pub const DELIVERY_SENT: &str = "delivery.sent";
pub const DELIVERY_DROPPED: &str = "delivery.dropped";
