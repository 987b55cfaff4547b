//! The ordered toast queue.
//!
//! One [`NotificationQueue`] per application. Pushes append in call
//! order, every mutation publishes the whole list over a watch
//! channel, and non-persistent toasts are taken down by per-toast
//! expiry tasks. All operations are infallible; a toast that is
//! already gone is simply a no-op to dismiss or update.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::timer::{Timer, TokioTimer};
use crate::toast::{Toast, ToastId, ToastKind, ToastPatch, ToastRequest};

/// Ordered list of live toasts with timed expiry.
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    toasts: watch::Sender<Vec<Toast>>,
    /// Expiry task per non-persistent toast, keyed by toast id.
    timers: Mutex<HashMap<ToastId, JoinHandle<()>>>,
    next_id: AtomicU64,
    timer: Arc<dyn Timer>,
}

impl NotificationQueue {
    /// Queue running on the real clock.
    pub fn new() -> Self {
        Self::with_timer(Arc::new(TokioTimer))
    }

    /// Queue whose expiry waits on the given [`Timer`].
    pub fn with_timer(timer: Arc<dyn Timer>) -> Self {
        let (toasts, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(QueueInner {
                toasts,
                timers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                timer,
            }),
        }
    }

    /// Watch the live toast list. The receiver sees every change, each
    /// as a full snapshot in display order.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Toast>> {
        self.inner.toasts.subscribe()
    }

    /// The live toasts right now, in display order.
    pub fn toasts(&self) -> Vec<Toast> {
        self.inner.toasts.borrow().clone()
    }

    /// Queue a toast and return its id.
    ///
    /// Loading toasts are always persistent, whatever the request
    /// says. Everything else expires after its duration, except that a
    /// zero duration disables expiry just like `persistent` does.
    pub fn push(&self, request: ToastRequest) -> ToastId {
        let id = ToastId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let persistent = request.persistent || request.kind == ToastKind::Loading;
        let toast = Toast {
            id,
            title: request
                .title
                .unwrap_or_else(|| request.kind.default_title().to_string()),
            message: request.message,
            kind: request.kind,
            duration: request.duration,
            persistent,
            action: request.action,
            secondary_action: request.secondary_action,
        };

        debug!(toast = id.0, kind = ?toast.kind, "Toast queued");
        self.inner.toasts.send_modify(|list| list.push(toast));
        if !persistent && request.duration > Duration::ZERO {
            self.arm_timer(id, request.duration);
        }
        id
    }

    /// Take a toast down now. Unknown or already-expired ids are a
    /// no-op.
    pub fn dismiss(&self, id: ToastId) {
        self.inner.cancel_timer(id);
        if self.inner.drop_toast(id) {
            debug!(toast = id.0, "Toast dismissed");
        }
    }

    /// Take every toast down, persistent ones included.
    pub fn dismiss_all(&self) {
        let cancelled: Vec<JoinHandle<()>> = {
            let mut timers = self.inner.timers.lock();
            timers.drain().map(|(_, task)| task).collect()
        };
        for task in cancelled {
            task.abort();
        }
        self.inner.toasts.send_if_modified(|list| {
            if list.is_empty() {
                false
            } else {
                list.clear();
                true
            }
        });
    }

    /// Patch a queued toast in place, keeping its position in the
    /// list. Returns false when the toast is already gone.
    ///
    /// Any update restarts the countdown: after the patch the toast
    /// either gets a fresh full duration, or no timer at all when the
    /// result is persistent or zero-duration. This is what turns a
    /// loading toast into an outcome toast that still auto-expires.
    pub fn update(&self, id: ToastId, patch: ToastPatch) -> bool {
        let mut rearm: Option<Duration> = None;
        let found = self.inner.toasts.send_if_modified(|list| {
            match list.iter_mut().find(|t| t.id == id) {
                Some(toast) => {
                    patch.apply(toast);
                    rearm = (!toast.persistent && toast.duration > Duration::ZERO)
                        .then_some(toast.duration);
                    true
                }
                None => false,
            }
        });
        if !found {
            return false;
        }

        self.inner.cancel_timer(id);
        if let Some(duration) = rearm {
            self.arm_timer(id, duration);
        }
        true
    }

    // -- convenience wrappers ------------------------------------------------

    pub fn success(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastRequest::new(message).kind(ToastKind::Success))
    }

    pub fn error(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastRequest::new(message).kind(ToastKind::Error))
    }

    pub fn warning(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastRequest::new(message).kind(ToastKind::Warning))
    }

    pub fn info(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastRequest::new(message).kind(ToastKind::Info))
    }

    /// Persistent spinner toast. Pair with [`dismiss`](Self::dismiss)
    /// or [`update`](Self::update), or let [`track`](Self::track)
    /// handle the pairing.
    pub fn loading(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastRequest::new(message).kind(ToastKind::Loading))
    }

    /// Run `operation` behind a loading toast.
    ///
    /// The loading toast comes down when the operation finishes, on
    /// both paths, and is replaced by a success or error toast built
    /// from the outcome. The operation's result passes through
    /// untouched.
    pub async fn track<T, E, F, S, Fe>(
        &self,
        loading_message: impl Into<String>,
        operation: F,
        on_success: S,
        on_error: Fe,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        S: FnOnce(&T) -> String,
        Fe: FnOnce(&E) -> String,
    {
        let loading_id = self.loading(loading_message);
        let result = operation.await;
        self.dismiss(loading_id);
        match &result {
            Ok(value) => {
                self.success(on_success(value));
            }
            Err(err) => {
                self.error(on_error(err));
            }
        }
        result
    }

    /// Spawn the expiry task for a toast. The timers lock is held
    /// across the spawn so the task cannot observe the map before its
    /// own handle is in it.
    fn arm_timer(&self, id: ToastId, duration: Duration) {
        let sleep = self.inner.timer.sleep(duration);
        let mut timers = self.inner.timers.lock();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            sleep.await;
            inner.timers.lock().remove(&id);
            if inner.drop_toast(id) {
                debug!(toast = id.0, "Toast expired");
            }
        });
        if let Some(old) = timers.insert(id, handle) {
            old.abort();
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueInner {
    /// Remove the toast row; true when something was actually removed.
    /// Subscribers are only notified when the list changed.
    fn drop_toast(&self, id: ToastId) -> bool {
        self.toasts.send_if_modified(|list| {
            let before = list.len();
            list.retain(|t| t.id != id);
            list.len() != before
        })
    }

    fn cancel_timer(&self, id: ToastId) {
        if let Some(task) = self.timers.lock().remove(&id) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;
    use crate::toast::DEFAULT_DURATION;

    /// Wait until the subscribed list satisfies `predicate`, with a
    /// real-time failsafe so a broken queue fails instead of hanging.
    async fn wait_for<F>(rx: &mut watch::Receiver<Vec<Toast>>, predicate: F)
    where
        F: Fn(&[Toast]) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("queue never reached the expected state");
    }

    fn manual_queue() -> (NotificationQueue, Arc<ManualTimer>) {
        let timer = Arc::new(ManualTimer::new());
        let queue = NotificationQueue::with_timer(timer.clone());
        (queue, timer)
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_and_order_is_preserved() {
        let (queue, _timer) = manual_queue();

        let a = queue.info("first");
        let b = queue.info("second");
        let c = queue.info("third");

        assert_eq!(a, ToastId(1));
        assert_eq!(b, ToastId(2));
        assert_eq!(c, ToastId(3));

        let toasts = queue.toasts();
        let messages: Vec<&str> = toasts.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_removal_never_reorders_survivors() {
        let (queue, _timer) = manual_queue();
        queue.info("first");
        let second = queue.info("second");
        queue.info("third");
        let fourth = queue.info("fourth");

        queue.dismiss(second);
        let messages: Vec<String> =
            queue.toasts().iter().map(|t| t.message.clone()).collect();
        assert_eq!(messages, ["first", "third", "fourth"]);

        queue.dismiss(fourth);
        let messages: Vec<String> =
            queue.toasts().iter().map(|t| t.message.clone()).collect();
        assert_eq!(messages, ["first", "third"]);
    }

    #[tokio::test]
    async fn test_defaults() {
        let (queue, _timer) = manual_queue();
        queue.push(ToastRequest::new("plain"));

        let toasts = queue.toasts();
        assert_eq!(toasts[0].kind, ToastKind::Info);
        assert_eq!(toasts[0].title, "Info");
        assert_eq!(toasts[0].duration, DEFAULT_DURATION);
        assert!(!toasts[0].persistent);
        assert!(toasts[0].action.is_none());
        assert!(toasts[0].secondary_action.is_none());
    }

    #[tokio::test]
    async fn test_explicit_title_wins_over_stock_title() {
        let (queue, _timer) = manual_queue();
        queue.push(
            ToastRequest::new("Track published to Discover")
                .kind(ToastKind::Success)
                .title("Published"),
        );

        assert_eq!(queue.toasts()[0].title, "Published");
    }

    #[tokio::test]
    async fn test_zero_duration_means_no_expiry() {
        let (queue, timer) = manual_queue();
        queue.push(
            ToastRequest::new("ok")
                .kind(ToastKind::Success)
                .duration(Duration::ZERO),
        );

        // Nothing was ever scheduled for it.
        assert_eq!(timer.pending(), 0);
        timer.advance(Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert_eq!(queue.toasts().len(), 1);

        // Bulk dismissal still takes it down.
        queue.dismiss_all();
        assert!(queue.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_toast_expires_at_its_deadline() {
        let (queue, timer) = manual_queue();
        let mut rx = queue.subscribe();
        queue.push(ToastRequest::new("soon").duration(Duration::from_secs(5)));

        // One second shy of the deadline nothing can have fired.
        timer.advance(Duration::from_secs(4));
        assert_eq!(queue.toasts().len(), 1);

        timer.advance(Duration::from_secs(1));
        wait_for(&mut rx, |list| list.is_empty()).await;
    }

    #[tokio::test]
    async fn test_toasts_expire_independently() {
        let (queue, timer) = manual_queue();
        let mut rx = queue.subscribe();
        queue.push(ToastRequest::new("short").duration(Duration::from_secs(2)));
        queue.push(ToastRequest::new("long").duration(Duration::from_secs(8)));

        timer.advance(Duration::from_secs(2));
        wait_for(&mut rx, |list| {
            list.len() == 1 && list[0].message == "long"
        })
        .await;

        timer.advance(Duration::from_secs(6));
        wait_for(&mut rx, |list| list.is_empty()).await;
    }

    #[tokio::test]
    async fn test_persistent_toast_never_expires() {
        let (queue, timer) = manual_queue();
        queue.push(ToastRequest::new("sticky").persistent());

        timer.advance(Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert_eq!(queue.toasts().len(), 1);
        // No expiry task was ever armed for it.
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test]
    async fn test_loading_is_persistent_even_when_not_asked() {
        let (queue, timer) = manual_queue();
        queue.loading("Uploading track");

        assert!(queue.toasts()[0].persistent);
        timer.advance(Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert_eq!(queue.toasts().len(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_is_idempotent() {
        let (queue, _timer) = manual_queue();
        let id = queue.info("gone soon");

        queue.dismiss(id);
        assert!(queue.toasts().is_empty());

        // Again, and an id that never existed.
        queue.dismiss(id);
        queue.dismiss(ToastId(999));
        assert!(queue.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_cancels_the_expiry_timer() {
        let (queue, timer) = manual_queue();
        let id = queue.push(ToastRequest::new("brief").duration(Duration::from_secs(5)));

        queue.dismiss(id);
        timer.advance(Duration::from_secs(10));
        tokio::task::yield_now().await;

        assert!(queue.toasts().is_empty());
        // A later toast reusing nothing: ids never recycle.
        let next = queue.info("after");
        assert!(next > id);
    }

    #[tokio::test]
    async fn test_dismiss_all_clears_everything() {
        let (queue, timer) = manual_queue();
        queue.info("a");
        queue.push(ToastRequest::new("b").persistent());
        queue.loading("c");

        queue.dismiss_all();
        assert!(queue.toasts().is_empty());

        timer.advance(Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert!(queue.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_update_patches_in_place() {
        let (queue, _timer) = manual_queue();
        let id = queue.info("Uploading 10%");

        assert!(queue.update(id, ToastPatch::new().message("Uploading 90%")));
        assert_eq!(queue.toasts()[0].message, "Uploading 90%");
        assert_eq!(queue.toasts()[0].id, id);

        assert!(!queue.update(ToastId(999), ToastPatch::new().message("nope")));
    }

    #[tokio::test]
    async fn test_update_rearms_expiry_for_flipped_loading_toast() {
        let (queue, timer) = manual_queue();
        let mut rx = queue.subscribe();
        let id = queue.loading("Publishing");

        // Loading toasts sit forever until flipped.
        timer.advance(Duration::from_secs(100));
        tokio::task::yield_now().await;
        assert_eq!(queue.toasts().len(), 1);

        let flipped = queue.update(
            id,
            ToastPatch::new()
                .kind(ToastKind::Success)
                .message("Published")
                .persistent(false)
                .duration(Duration::from_secs(3)),
        );
        assert!(flipped);
        assert_eq!(queue.toasts()[0].kind, ToastKind::Success);

        timer.advance(Duration::from_secs(3));
        wait_for(&mut rx, |list| list.is_empty()).await;
    }

    #[tokio::test]
    async fn test_update_to_persistent_cancels_expiry() {
        let (queue, timer) = manual_queue();
        let id = queue.push(ToastRequest::new("pinned?").duration(Duration::from_secs(5)));

        assert!(queue.update(id, ToastPatch::new().persistent(true)));
        timer.advance(Duration::from_secs(3600));
        tokio::task::yield_now().await;

        assert_eq!(queue.toasts().len(), 1);
    }

    #[tokio::test]
    async fn test_track_success_path() {
        let (queue, _timer) = manual_queue();

        let result = queue
            .track(
                "Saving draft",
                async { Ok::<_, String>(42) },
                |n| format!("Draft {n} saved"),
                |e| e.clone(),
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        let toasts = queue.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Success);
        assert_eq!(toasts[0].message, "Draft 42 saved");
    }

    #[tokio::test]
    async fn test_track_error_path_still_removes_loading() {
        let (queue, _timer) = manual_queue();

        let result: Result<(), String> = queue
            .track(
                "Saving draft",
                async { Err("disk full".to_string()) },
                |_| unreachable!(),
                |e| format!("Could not save: {e}"),
            )
            .await;

        assert!(result.is_err());
        let toasts = queue.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].message, "Could not save: disk full");
        assert!(!toasts.iter().any(|t| t.kind == ToastKind::Loading));
    }

    #[tokio::test]
    async fn test_track_shows_loading_while_in_flight() {
        let (queue, _timer) = manual_queue();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        let tracked = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .track(
                        "Working",
                        async move {
                            let _ = gate_rx.await;
                            Ok::<_, String>(())
                        },
                        |_| "Done".to_string(),
                        |e| e.clone(),
                    )
                    .await
            })
        };

        let mut rx = queue.subscribe();
        wait_for(&mut rx, |list| {
            list.len() == 1 && list[0].kind == ToastKind::Loading
        })
        .await;

        gate_tx.send(()).unwrap();
        tracked.await.unwrap().unwrap();

        let toasts = queue.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Success);
    }

    #[tokio::test]
    async fn test_real_clock_expiry() {
        let queue = NotificationQueue::new();
        let mut rx = queue.subscribe();
        queue.push(ToastRequest::new("blink").duration(Duration::from_millis(20)));

        wait_for(&mut rx, |list| list.is_empty()).await;
    }
}
