use tokio::signal;

pub use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle};

/// Create the shutdown handle for a run and raise it when the user presses Ctrl-C.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => log::warn!("Unable to listen for Ctrl-C, stop the run with the duration instead: {e:?}"),
        }
    });

    Ok(handle)
}
