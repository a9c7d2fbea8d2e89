pub mod tasks;


use sanctions::data::Data;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to the background reconciliation loop
///
/// Start exactly once per process, shut down exactly once; the handle is
/// consumed by `shutdown` so a double stop does not typecheck.
pub struct Reconciler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reconciler {
    /// Spawn the loop, ticking at the engine's configured interval
    ///
    /// Call after the engine's `Data` is built; building it rebuilds the
    /// sanction index, so the first pass never scans a stale one.
    pub fn start(data: Arc<Data>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let period = data.config.reconcile_interval();
        let handle = tokio::spawn(run(data, period, rx));

        Self { shutdown, handle }
    }

    /// Stop ticking and wait for any in-flight pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.handle.await {
            log::error!("Error while joining the reconciler task: {}", e);
        }
    }
}

async fn run(data: Arc<Data>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {}
        }

        if *shutdown.borrow() {
            log::info!("Reconciler stopping");
            return;
        }

        log::info!(
            "TASK: temporary_sanctions ({}s interval) [Reverse expired sanctions]",
            period.as_secs()
        );

        if let Err(e) = tasks::reconcile_expired(&data, &shutdown).await {
            log::error!("TASK temporary_sanctions ERROR'd: {:?}", e);
        }
    }
}
