use std::io;

use log::info;
use tokio::signal;

/// Block until the process is asked to shut down: Ctrl+C, or SIGTERM on Unix.
pub fn wait_for_shutdown() -> io::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(shutdown_signal())
}

#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{self, SignalKind};

    let mut terminate = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Received Ctrl+C, shutting down.");
        }
        _ = terminate.recv() => info!("Received SIGTERM, shutting down."),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down.");
    Ok(())
}
