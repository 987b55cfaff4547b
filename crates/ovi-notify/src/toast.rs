//! Toast records as the UI layer renders them.
//!
//! These serialize with camelCase keys and millisecond durations, the
//! shape the front end consumes directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a toast stays up when the caller does not say otherwise.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Queue-assigned toast identifier. Monotonic per queue, starting at 1,
/// never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ToastId(pub u64);

/// Visual category of a toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Error,
    Warning,
    /// Spinner variant for an operation in flight. Loading toasts never
    /// expire on their own; something has to dismiss or update them.
    Loading,
}

impl ToastKind {
    /// Title used when the caller does not set one.
    pub fn default_title(self) -> &'static str {
        match self {
            ToastKind::Info => "Info",
            ToastKind::Success => "Success",
            ToastKind::Error => "Error",
            ToastKind::Warning => "Warning",
            ToastKind::Loading => "Loading",
        }
    }
}

/// Button rendered on a toast. The `command` string is dispatched back
/// through the UI layer when the button is clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastAction {
    pub label: String,
    pub command: String,
}

/// A queued toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: ToastId,
    pub title: String,
    pub message: String,
    pub kind: ToastKind,
    /// How long the toast stays up. Zero means forever; also
    /// meaningless while `persistent`.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub persistent: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<ToastAction>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub secondary_action: Option<ToastAction>,
}

/// What a caller asks the queue to show. Defaults: info kind, the
/// kind's stock title, the standard duration, not persistent, no
/// actions.
#[derive(Debug, Clone)]
pub struct ToastRequest {
    pub title: Option<String>,
    pub message: String,
    pub kind: ToastKind,
    pub duration: Duration,
    pub persistent: bool,
    pub action: Option<ToastAction>,
    pub secondary_action: Option<ToastAction>,
}

impl ToastRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            title: None,
            message: message.into(),
            kind: ToastKind::Info,
            duration: DEFAULT_DURATION,
            persistent: false,
            action: None,
            secondary_action: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn kind(mut self, kind: ToastKind) -> Self {
        self.kind = kind;
        self
    }

    /// Zero disables auto-expiry, same as [`persistent`](Self::persistent).
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Keep the toast up until it is dismissed or updated.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn action(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.action = Some(ToastAction {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    pub fn secondary_action(
        mut self,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        self.secondary_action = Some(ToastAction {
            label: label.into(),
            command: command.into(),
        });
        self
    }
}

/// Partial update for a queued toast. `None` fields keep their current
/// value.
#[derive(Debug, Clone, Default)]
pub struct ToastPatch {
    pub title: Option<String>,
    pub message: Option<String>,
    pub kind: Option<ToastKind>,
    pub duration: Option<Duration>,
    pub persistent: Option<bool>,
    pub action: Option<Option<ToastAction>>,
    pub secondary_action: Option<Option<ToastAction>>,
}

impl ToastPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(mut self, kind: ToastKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    pub fn action(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.action = Some(Some(ToastAction {
            label: label.into(),
            command: command.into(),
        }));
        self
    }

    pub fn clear_action(mut self) -> Self {
        self.action = Some(None);
        self
    }

    pub fn secondary_action(
        mut self,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        self.secondary_action = Some(Some(ToastAction {
            label: label.into(),
            command: command.into(),
        }));
        self
    }

    pub(crate) fn apply(&self, toast: &mut Toast) {
        if let Some(title) = &self.title {
            toast.title = title.clone();
        }
        if let Some(message) = &self.message {
            toast.message = message.clone();
        }
        if let Some(kind) = self.kind {
            toast.kind = kind;
        }
        if let Some(duration) = self.duration {
            toast.duration = duration;
        }
        if let Some(persistent) = self.persistent {
            toast.persistent = persistent;
        }
        if let Some(action) = &self.action {
            toast.action = action.clone();
        }
        if let Some(secondary) = &self.secondary_action {
            toast.secondary_action = secondary.clone();
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
