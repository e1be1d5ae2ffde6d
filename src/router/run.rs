use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::Handle as ServerHandle;
use typing_core::{Result, Server, debug, error, info};
use typing_service::Services;

use crate::{layers, serve};

/// Builds every service and starts their worker loops (today, just
/// `sending`'s federation-egress drain). Mirrors the teacher's own
/// start/run/stop split so the daemon's lifecycle reads the same way.
pub async fn start(server: &Arc<Server>) -> Result<Arc<Services>> {
	debug!("Starting...");
	let services = Services::build(server)?;
	services.start_workers(&tokio::runtime::Handle::current());
	debug!("Started");
	Ok(services)
}

/// Serves the HTTP surface until the server's shutdown signal fires, then
/// waits for the listener to unwind.
pub async fn run(server: &Arc<Server>, services: Arc<Services>) -> Result<()> {
	let app = layers::build(services)?;
	let handle = ServerHandle::new();

	let watcher = tokio::spawn(watch_signal(Arc::clone(server), handle.clone()));

	let addr = SocketAddr::new(server.config.address, server.config.port);
	let result = serve::plain(app, handle, addr).await.map_err(typing_core::Error::from);

	watcher.abort();
	let _ = watcher.await;

	if let Err(e) = &result {
		error!("HTTP listener exited with error: {e}");
	}

	result
}

/// Signals every service to stop. There is nothing left to flush: the
/// typing state is soft state by design (§3) and is dropped along with the
/// services.
pub async fn stop(services: Arc<Services>) -> Result<()> {
	debug!("Shutting down...");
	services.interrupt();
	info!("Shutdown complete.");
	Ok(())
}

/// Watches the server's shutdown broadcast (fed by OS signal handling in the
/// daemon binary) and asks the HTTP listener to drain in-flight requests and
/// stop.
async fn watch_signal(server: Arc<Server>, handle: ServerHandle) {
	let mut signal = server.signal.subscribe();
	while signal.recv().await.is_ok() {
		if !server.running() {
			handle.graceful_shutdown(Some(Duration::from_secs(30)));
			break;
		}
	}
}
