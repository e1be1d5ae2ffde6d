use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::signal;
use typing_core::{Clock, Config, Error, Result, Server, debug_info, error, warn};

/// Commandline arguments for the typing-notification daemon.
#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
	/// Path to a TOML config file. `TYPING__`-prefixed environment
	/// variables are layered on top and take precedence.
	#[arg(short, long)]
	config: Option<PathBuf>,
}

fn main() -> Result<()> {
	let args = Args::parse();
	let config = Config::load(args.config.as_ref())?;
	typing_core::log::init(&config.log)?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.thread_name("typingd:worker")
		.build()
		.map_err(Error::from)?;

	runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<()> {
	let clock = Clock::real();
	let server = Arc::new(Server::new(config, clock));

	tokio::spawn(watch_os_signals(Arc::clone(&server)));

	let services = typing_router::start(&server).await?;

	if let Err(e) = typing_router::run(&server, Arc::clone(&services)).await {
		error!("critical error while running: {e}");
	}

	typing_router::stop(services).await?;

	debug_info!("Exit");
	Ok(())
}

/// Translates Ctrl+C / SIGTERM into the server's own shutdown signal; the
/// actual graceful drain is driven from inside `typing_router::run` by
/// whoever is subscribed to `server.signal`.
async fn watch_os_signals(server: Arc<Server>) {
	let ctrl_c = signal::ctrl_c();

	#[cfg(unix)]
	{
		let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler");

		tokio::select! {
			_ = ctrl_c => warn!("Received Ctrl+C"),
			_ = terminate.recv() => warn!("Received SIGTERM"),
		}
	}

	#[cfg(not(unix))]
	{
		let _ = ctrl_c.await;
		warn!("Received Ctrl+C");
	}

	if let Err(e) = server.shutdown() {
		error!("failed to signal shutdown: {e}");
	}
}
