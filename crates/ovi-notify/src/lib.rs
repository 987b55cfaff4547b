//! Toast notifications for the Ovi client core.
//!
//! The queue is UI-agnostic: it owns ordering, ids, expiry and
//! dismissal, and publishes full snapshots of the live list over a
//! watch channel. Whatever renders the toasts just subscribes.

pub mod queue;
pub mod timer;
pub mod toast;

pub use queue::NotificationQueue;
pub use timer::{ManualTimer, SleepFuture, Timer, TokioTimer};
pub use toast::{
    Toast, ToastAction, ToastId, ToastKind, ToastPatch, ToastRequest, DEFAULT_DURATION,
};
