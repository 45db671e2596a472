use {
    super::*,
    crate::{
        p2p::Listener,
        stratum::{Client, ClientConfig},
        worker::Worker,
    },
};

const SHARE_QUEUE_DEPTH: usize = 256;

pub fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c() => {
                    info!("received shutdown signal (Ctrl-C / SIGINT)");
                }
                _ = sigterm.recv() => {
                    info!("received shutdown signal (SIGTERM)");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c().await.ok();
            info!("received shutdown signal (Ctrl-C)");
        }

        cancel_clone.cancel();
    });

    cancel
}

fn logs_enabled() -> bool {
    env::var_os("RUST_LOG").is_some()
}

/// Wires the whole miner together: kernel detection, worker threads, the
/// Stratum client, the optional P2P listener, and the status line; tears
/// everything down when the cancellation token fires or the client exits.
pub struct Controller {
    pub stratum_address: String,
    pub username: String,
    pub password: Option<String>,
    pub p2p_address: Option<String>,
    pub cpu_cores: Option<usize>,
}

impl Controller {
    pub async fn run(self, cancel: CancellationToken) -> Result {
        let kernel = Kernel::detect();
        info!("hash kernel variant: {}", kernel.variant());

        let mut system = System::new();
        system.refresh_cpu_all();
        let available = system.cpus().len().max(1);

        // Two cores stay free for the network peers by default.
        let workers = self
            .cpu_cores
            .map(|cores| cores.min(available))
            .unwrap_or_else(|| available.saturating_sub(2))
            .max(1);

        info!("mining on {workers} of {available} cores");

        let dispatcher = Arc::new(Dispatcher::new(workers));
        let shares = Arc::new(ShareQueue::new(SHARE_QUEUE_DEPTH));
        let metrics = Arc::new(Metrics::new(workers, kernel.variant()));

        let handles: Vec<_> = (0..workers)
            .map(|index| {
                Worker {
                    index,
                    dispatcher: dispatcher.clone(),
                    shares: shares.clone(),
                    metrics: metrics.clone(),
                    kernel,
                    cancel: cancel.clone(),
                }
                .spawn()
            })
            .collect();

        let listener = self.p2p_address.clone().map(|address| {
            task::spawn(
                Listener {
                    address,
                    metrics: metrics.clone(),
                    cancel: cancel.clone(),
                }
                .run(),
            )
        });

        let status = (!logs_enabled()).then(|| {
            task::spawn(metrics::status_line(metrics.clone(), cancel.clone()))
        });

        let client = Client::new(
            ClientConfig::new(
                self.stratum_address.clone(),
                self.username.clone(),
                self.password.clone(),
            ),
            dispatcher.clone(),
            shares.clone(),
            metrics.clone(),
            cancel.clone(),
        );

        let result = client.run().await;

        cancel.cancel();

        for handle in handles {
            let _ = handle.join();
        }

        if let Some(listener) = listener {
            let _ = listener.await;
        }

        if let Some(status) = status {
            let _ = status.await;
            println!();
        }

        info!(
            "final counters: {}",
            serde_json::to_string(&metrics.snapshot())?
        );

        result?;

        Ok(())
    }
}
