//! Application lifecycle management and graceful shutdown.
//!
//! Startup spawns the queue consumer and the slot cleaner, then serves
//! HTTP. On SIGINT/SIGTERM the server stops accepting connections, the
//! shutdown signal is broadcast to the background tasks, and each gets a
//! bounded window to finish its current work.

use crate::admission::SlotCleaner;
use crate::bus::QueueJoinConsumer;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A fully wired application ready to run.
pub struct Application {
    listener: tokio::net::TcpListener,
    router: axum::Router,
    consumer: QueueJoinConsumer,
    cleaner: SlotCleaner,
    shutdown_tx: broadcast::Sender<()>,
    drain_timeout: Duration,
}

impl Application {
    /// Assemble an application from its parts.
    #[must_use]
    pub fn new(
        listener: tokio::net::TcpListener,
        router: axum::Router,
        consumer: QueueJoinConsumer,
        cleaner: SlotCleaner,
        shutdown_tx: broadcast::Sender<()>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            router,
            consumer,
            cleaner,
            shutdown_tx,
            drain_timeout,
        }
    }

    /// Run until a shutdown signal, then drain background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let consumer_handle = self.consumer.spawn();
        let cleaner_handle = self.cleaner.spawn();

        info!("HTTP server listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped, draining background tasks");
        let _ = self.shutdown_tx.send(());

        for (name, handle) in [("consumer", consumer_handle), ("cleaner", cleaner_handle)] {
            match tokio::time::timeout(self.drain_timeout, handle).await {
                Ok(Ok(())) => info!(task = name, "task stopped gracefully"),
                Ok(Err(e)) => warn!(task = name, error = %e, "task failed during shutdown"),
                Err(_) => warn!(task = name, "task shutdown timed out"),
            }
        }

        info!("graceful shutdown complete");
        Ok(())
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, shutting down gracefully");
        }
        () = terminate => {
            info!("received SIGTERM, shutting down gracefully");
        }
    }
}
