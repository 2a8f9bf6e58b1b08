use backslash_core::{Error, Session};
use std::time::Duration;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::*;

/// Background task sending keepalives for a session.
///
/// A keepalive goes out every half `interval`. The first failure is logged,
/// handed to the error callback and ends the task. Dropping the handle also
/// stops the task.
pub struct KeepAlive {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn<F>(session: Session, interval: Duration, on_error: F) -> KeepAlive
    where
        F: FnOnce(Error) + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);
        let period = (interval / 2).max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            debug!("keepalive task started for {session:?}");
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticks.tick() => {
                        if let Err(e) = session.send_keepalive().await {
                            error!("quitting keepalive task: {e}");
                            on_error(e);
                            break;
                        }
                    }
                }
            }
            debug!("keepalive task terminated");
        });

        KeepAlive { stop, task }
    }

    pub fn stop(&self) {
        // The task may already have exited after an error.
        let _ = self.stop.send(true);
    }

    /// Stops the task and waits for it to exit.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!("keepalive task panicked: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
