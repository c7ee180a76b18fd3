use squall_runner::prelude::{Engine, RequestExecutor};
use tokio::signal;

/// Stop every active run when Ctrl-C is received.
pub(crate) fn start_shutdown_listener<E: RequestExecutor>(engine: Engine<E>) {
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, runs can only end at their deadline: {e}");
            return;
        }

        println!(
            "Received shutdown signal, stopping {} runs with {} workers...",
            engine.active_count(),
            engine.active_workers()
        );
        engine.stop_all();
    });
}
