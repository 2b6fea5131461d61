//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length. A client that sends `subscribe` is switched to a push-only
//! notification stream after the confirmation response.

use serde::{Deserialize, Serialize};

/// Requests from companion UIs (overlay, menu-bar app) to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to guard notifications
    Subscribe,
}

/// Responses from daemon to companion UIs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed; notifications follow on this connection
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The confirmation indicator should be displayed
    HudShow,

    /// The confirmation indicator should be hidden
    HudDismiss,

    /// An accidental quit was prevented
    QuitPrevented {
        /// Running total of prevented quits
        total: u64,
    },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the quit taps are installed and active
    pub guarding: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Total accidental quits prevented so far
    pub quits_prevented: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            guarding: false,
            uptime_secs: 0,
            quits_prevented: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::GetStatus;
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("get_status"));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("guarding"));
    }

    #[test]
    fn test_notification_deserialization() {
        let json = r#"{"type":"quit_prevented","total":7}"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notification, Notification::QuitPrevented { total: 7 });
    }
}
