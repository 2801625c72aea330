//! A relay actor running on the test runtime.

use crate::fixtures::TestConnection;
use session_relay::actors::{RelayActorHandle, RelayStatus};
use session_relay::coordinator::SessionCoordinator;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawned relay actor plus the token that owns it.
#[derive(Debug)]
pub struct TestRelay {
    pub handle: RelayActorHandle,
    pub root_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestRelay {
    /// Spawn a relay actor under a fresh root token.
    #[must_use]
    pub fn start(report_moderation_denials: bool) -> Self {
        let root_token = CancellationToken::new();
        let (handle, task) = RelayActorHandle::spawn(
            "relay-test".to_string(),
            SessionCoordinator::new(report_moderation_denials),
            root_token.child_token(),
        );
        Self {
            handle,
            root_token,
            task,
        }
    }

    /// Create a test connection and register it through the actor.
    ///
    /// # Panics
    ///
    /// Panics if the relay refuses the connection.
    pub async fn connect(&self, id: impl Into<String>) -> TestConnection {
        let conn = TestConnection::new(id);
        self.handle
            .connect(conn.id.clone(), conn.sink.clone())
            .await
            .expect("relay refused test connection");
        conn
    }

    /// # Panics
    ///
    /// Panics if the actor is gone.
    pub async fn status(&self) -> RelayStatus {
        self.handle
            .get_status()
            .await
            .expect("relay status unavailable")
    }

    /// Wait for the actor task to finish.
    ///
    /// # Panics
    ///
    /// Panics if the task does not stop within `timeout` or panicked.
    pub async fn join(self, timeout: Duration) {
        tokio::time::timeout(timeout, self.task)
            .await
            .expect("relay actor did not stop in time")
            .expect("relay actor panicked");
    }
}
