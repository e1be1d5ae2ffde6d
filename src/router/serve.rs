use std::{io, net::SocketAddr};

use axum::Router;
use axum_server::{Handle as ServerHandle, bind};
use typing_core::info;

/// Binds the plain-HTTP listener and serves until `handle` is told to shut
/// down gracefully. This daemon is meant to sit behind a reverse proxy for
/// TLS termination, the same way the teacher's own deployment docs recommend
/// even when direct TLS is available; this subsystem doesn't carry that
/// option at all.
pub(crate) async fn plain(app: axum::routing::IntoMakeService<Router>, handle: ServerHandle, addr: SocketAddr) -> io::Result<()> {
	info!("Listening on {addr}");
	bind(addr).handle(handle).serve(app).await
}
