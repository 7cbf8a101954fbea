//! Wire format for events pushed to WebSocket and MCP subscribers.
//!
//! Every event serializes to a JSON object whose `type` field selects the
//! schema. Provider connections use a dynamic type (`github_connected`,
//! `box_connected`, ...), so serialization goes through
//! [`Event::to_wire_json`] rather than bare serde.

use serde::{Deserialize, Serialize};

use lorebase_core::{IndexStatus, SyncStatus};

/// An event as fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Created {
        path: String,
        is_dir: bool,
    },
    Modified {
        path: String,
        is_dir: bool,
    },
    Deleted {
        path: String,
        is_dir: bool,
    },
    Moved {
        path: String,
        dest_path: String,
        is_dir: bool,
    },
    IndexStatus {
        path: String,
        status: IndexStatus,
    },
    IndexComplete {
        path: String,
        files_indexed: u64,
        total_chunks: u64,
    },
    SyncStatus {
        path: String,
        status: SyncStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        auth_required: bool,
    },
    /// Serialized as `{provider}_connected` on the wire.
    Connected {
        provider: String,
        path: String,
    },
    Ping,
}

/// Topic a subscriber attaches to. Ordering holds within a topic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Filesystem,
    Index,
    Sync,
    Connect,
}

impl Event {
    /// The topic this event publishes on.
    pub fn topic(&self) -> Topic {
        match self {
            Event::Created { .. }
            | Event::Modified { .. }
            | Event::Deleted { .. }
            | Event::Moved { .. } => Topic::Filesystem,
            Event::IndexStatus { .. } | Event::IndexComplete { .. } => Topic::Index,
            Event::SyncStatus { .. } => Topic::Sync,
            Event::Connected { .. } => Topic::Connect,
            Event::Ping => Topic::Connect,
        }
    }

    /// JSON object with the `type` discriminator, including the dynamic
    /// `{provider}_connected` type.
    pub fn to_wire_json(&self) -> serde_json::Value {
        match self {
            Event::Connected { provider, path } => serde_json::json!({
                "type": format!("{provider}_connected"),
                "provider": provider,
                "path": path,
            }),
            other => serde_json::to_value(other).expect("event serialization is infallible"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_types_on_the_wire() {
        let json = Event::Modified {
            path: "docs/a.txt".into(),
            is_dir: false,
        }
        .to_wire_json();
        assert_eq!(json["type"], "modified");
        assert_eq!(json["path"], "docs/a.txt");

        let json = Event::IndexComplete {
            path: "docs".into(),
            files_indexed: 2,
            total_chunks: 9,
        }
        .to_wire_json();
        assert_eq!(json["type"], "index_complete");
        assert_eq!(json["files_indexed"], 2);
    }

    #[test]
    fn index_status_carries_status_string() {
        let json = Event::IndexStatus {
            path: "docs".into(),
            status: IndexStatus::Indexing,
        }
        .to_wire_json();
        assert_eq!(json["type"], "index_status");
        assert_eq!(json["status"], "indexing");
    }

    #[test]
    fn provider_connected_dynamic_type() {
        let json = Event::Connected {
            provider: "google_drive".into(),
            path: "drive".into(),
        }
        .to_wire_json();
        assert_eq!(json["type"], "google_drive_connected");
        assert_eq!(json["path"], "drive");
    }

    #[test]
    fn sync_status_omits_clean_fields() {
        let json = Event::SyncStatus {
            path: "docs".into(),
            status: SyncStatus::Synced,
            error: None,
            auth_required: false,
        }
        .to_wire_json();
        assert_eq!(json["type"], "sync_status");
        assert!(json.get("error").is_none());
        assert!(json.get("auth_required").is_none());

        let json = Event::SyncStatus {
            path: "docs".into(),
            status: SyncStatus::Error,
            error: Some("token expired".into()),
            auth_required: true,
        }
        .to_wire_json();
        assert_eq!(json["auth_required"], true);
    }

    #[test]
    fn topics() {
        assert_eq!(
            Event::Created {
                path: "x".into(),
                is_dir: false
            }
            .topic(),
            Topic::Filesystem
        );
        assert_eq!(
            Event::SyncStatus {
                path: "x".into(),
                status: SyncStatus::Idle,
                error: None,
                auth_required: false
            }
            .topic(),
            Topic::Sync
        );
    }
}
