use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel body written over a disappearing message when its timer fires
pub const DISAPPEARED_BODY: &str = "Message disappeared";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

/// Delivery/read lifecycle flags, mutated only by the delivery engine.
///
/// Transitions are monotonic: sent -> delivered -> read. Read implies
/// delivered; delivered never reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub sent: bool,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Disappearing {
    pub enabled: bool,
    /// Seconds after creation at which the content is redacted
    pub duration_secs: Option<i64>,
    /// Persisted due-time; the in-memory timer is re-derived from this on restart
    pub expire_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewOnce {
    pub enabled: bool,
    pub viewed_by: Vec<String>,
    pub viewed_at: Option<DateTime<Utc>>,
}

/// A chat message as seen by this subsystem. The durable copy lives in the
/// message store; this subsystem owns the lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    /// Reference to an externally stored attachment, cleared on redaction
    #[serde(default)]
    pub attachment: Option<String>,
    /// Named `kind` on the wire: `type` is the event-envelope tag when the
    /// message rides a stream frame
    #[serde(default)]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub disappearing: Disappearing,
    #[serde(default)]
    pub view_once: ViewOnce,
}

impl Message {
    pub fn new(sender_id: &str, recipient_id: &str, body: &str, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            attachment: None,
            kind,
            created_at: Utc::now(),
            lifecycle: Lifecycle::default(),
            disappearing: Disappearing::default(),
            view_once: ViewOnce::default(),
        }
    }

    /// Arm disappearing semantics: the due-time is anchored to `created_at`.
    /// Durations too large to represent saturate to the far future rather
    /// than overflowing.
    pub fn with_disappearing(mut self, duration_secs: i64) -> Self {
        let expire_at = Duration::try_seconds(duration_secs)
            .and_then(|d| self.created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.disappearing = Disappearing {
            enabled: true,
            duration_secs: Some(duration_secs),
            expire_at: Some(expire_at),
            expired: false,
        };
        self
    }

    pub fn with_view_once(mut self) -> Self {
        self.view_once.enabled = true;
        self
    }

    pub fn with_attachment(mut self, attachment: &str) -> Self {
        self.attachment = Some(attachment.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

/// Outbound event vocabulary pushed over a client's stream.
///
/// Internally tagged on `type` so clients can dispatch on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    KeepAlive,
    #[serde(rename_all = "camelCase")]
    OnlineUsersList { users: Vec<String> },
    #[serde(rename_all = "camelCase")]
    UserStatus {
        user_id: String,
        is_online: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MessageStatus {
        message_id: String,
        status: ReceiptStatus,
    },
    #[serde(rename_all = "camelCase")]
    MessageViewed {
        message_id: String,
        viewed_by: String,
        viewed_at: DateTime<Utc>,
    },
    Message(Message),
    #[serde(rename_all = "camelCase")]
    ConnectionClosed { reason: String },
}
