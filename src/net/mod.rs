//! TCP front end: accept loop, per-connection handlers, line codec

pub mod connection;
pub mod handler;
pub mod lines;
pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::app::ServerContext;

pub use handler::handle_connection;

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept clients until the server stops. Each socket gets its own task.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) {
    let mut stopping = ctx.subscribe_stop();

    loop {
        let accepted = tokio::select! {
            _ = stopping.wait_for(|s| *s) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                tokio::spawn(handle_connection(stream, addr.to_string(), ctx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Listener closed");
}
