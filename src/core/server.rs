use std::{sync::atomic::AtomicBool, time::SystemTime};

use tokio::sync::broadcast;

use crate::{Clock, Config};

/// Process-wide runtime state shared by every service.
pub struct Server {
	pub config: Config,

	/// Timestamp the server was started; used for uptime.
	pub started: SystemTime,

	/// Set once graceful shutdown has begun. Observable; should not be
	/// written outside of `Server::shutdown`.
	pub stopping: AtomicBool,

	/// Broadcasts a shutdown signal to every worker task.
	pub signal: broadcast::Sender<&'static str>,

	/// Time source for the whole server; swapped for a `FakeClock` in tests.
	pub clock: Clock,
}

impl Server {
	#[must_use]
	pub fn new(config: Config, clock: Clock) -> Self {
		Self {
			config,
			started: SystemTime::now(),
			stopping: AtomicBool::new(false),
			signal: broadcast::channel::<&'static str>(1).0,
			clock,
		}
	}

	pub fn shutdown(&self) -> crate::Result<()> {
		use std::sync::atomic::Ordering;

		if self.stopping.swap(true, Ordering::AcqRel) {
			return crate::Err!("Shutdown already in progress");
		}

		self.signal
			.send("SIGTERM")
			.map_err(|e| crate::err!("Failed to send shutdown signal: {e}"))?;

		Ok(())
	}

	#[inline]
	pub fn running(&self) -> bool { !self.stopping.load(std::sync::atomic::Ordering::Acquire) }
}
