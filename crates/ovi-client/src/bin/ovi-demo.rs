//! # ovi-demo
//!
//! Scripted walkthrough of the Ovi client stack against the
//! in-process backend:
//! - session restore and reactive profile reconciliation
//! - login/register/logout with toast feedback
//! - the notification queue's timers, updates and dismissal
//!
//! Run with `RUST_LOG=debug` for the full trace.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use ovi_backend::{MemoryBackend, MemoryProfiles};
use ovi_client::{init_tracing, ClientConfig, OviClient};
use ovi_notify::{ToastKind, ToastPatch, ToastRequest};
use ovi_session::SessionSnapshot;

async fn settle<F>(rx: &mut watch::Receiver<SessionSnapshot>, predicate: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    loop {
        {
            let current = rx.borrow_and_update();
            if predicate(&current) {
                return current.clone();
            }
        }
        rx.changed().await.expect("session channel closed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting Ovi demo v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration (logged only; the demo stays in-process)
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Wire the client over the in-process backend
    // -----------------------------------------------------------------------
    let backend = Arc::new(MemoryBackend::new());
    let profiles = Arc::new(MemoryProfiles::new());
    backend.seed_account("vera@ovi.network", "correct-horse");

    let client = OviClient::new(backend.clone(), profiles.clone());
    let mut session_rx = client.session.subscribe();

    // Print every toast state the way a UI would render it.
    let mut toast_rx = client.notifications.subscribe();
    tokio::spawn(async move {
        loop {
            {
                let toasts = toast_rx.borrow_and_update();
                let line = toasts
                    .iter()
                    .map(|t| format!("[{}] {}", t.title, t.message))
                    .collect::<Vec<_>>()
                    .join(" | ");
                info!(count = toasts.len(), "Toasts: {line}");
            }
            if toast_rx.changed().await.is_err() {
                break;
            }
        }
    });

    settle(&mut session_rx, |s| !s.loading).await;
    info!("Startup restore settled: nobody signed in");

    // -----------------------------------------------------------------------
    // 4. A failed login surfaces the user-facing catalog message
    // -----------------------------------------------------------------------
    let err = client
        .login("vera@ovi.network", "wrong-password")
        .await
        .unwrap_err();
    info!(message = %err, "Login rejected as expected");

    // -----------------------------------------------------------------------
    // 5. A successful login reconciles the profile reactively
    // -----------------------------------------------------------------------
    client.login("vera@ovi.network", "correct-horse").await?;
    let snapshot = settle(&mut session_rx, |s| s.is_authenticated()).await;
    info!(
        status = ?snapshot.status(),
        profiles = profiles.len(),
        "Signed in; profile row created on first login"
    );
    info!(
        "Session snapshot:\n{}",
        serde_json::to_string_pretty(&snapshot)?
    );

    // -----------------------------------------------------------------------
    // 6. Notification queue: expiry, updates, persistence
    // -----------------------------------------------------------------------
    let blink = client.notifications.push(
        ToastRequest::new("This one disappears on its own")
            .duration(Duration::from_millis(300)),
    );
    let pinned = client.notifications.push(
        ToastRequest::new("Storage is almost full")
            .kind(ToastKind::Warning)
            .persistent()
            .action("Manage", "storage.open"),
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    info!(
        expired = !client.notifications.toasts().iter().any(|t| t.id == blink),
        "Short-lived toast expired while the pinned one stayed"
    );

    let upload = client.notifications.loading("Uploading track...");
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.notifications.update(
        upload,
        ToastPatch::new()
            .kind(ToastKind::Success)
            .message("Track uploaded")
            .persistent(false),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.notifications.dismiss(pinned);
    client.notifications.dismiss_all();

    // -----------------------------------------------------------------------
    // 7. Sign out, then register a fresh account
    // -----------------------------------------------------------------------
    client.logout().await?;
    info!("Signed out; snapshot cleared synchronously");

    client
        .register("nova@ovi.network", "hunter22", "Nova Sky")
        .await?;
    let snapshot = settle(&mut session_rx, |s| s.is_authenticated()).await;
    info!(
        user = %snapshot.user.as_ref().map(|u| u.name.as_str()).unwrap_or("?"),
        "Registered and signed in"
    );

    // -----------------------------------------------------------------------
    // 8. Registration with email confirmation turned on
    // -----------------------------------------------------------------------
    let gated = OviClient::new(
        Arc::new(MemoryBackend::with_confirmation_required()),
        Arc::new(MemoryProfiles::new()),
    );
    let registration = gated
        .register("pending@ovi.network", "hunter22", "Pending")
        .await?;
    info!(
        requires_confirmation = registration.requires_confirmation(),
        toasts = gated.notifications.toasts().len(),
        "Confirmation-pending registration leaves an inbox reminder"
    );

    info!("Demo complete");
    Ok(())
}
