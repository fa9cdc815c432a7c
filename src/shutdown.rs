use tokio::sync::watch;

/// Sending half of the shutdown signal.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cloneable listener for the shutdown signal. If the trigger is dropped
/// without firing, listeners keep waiting.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Fire `trigger` on Ctrl-C.
pub fn trigger_on_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutdown requested");
        trigger.trigger();
    });
}
