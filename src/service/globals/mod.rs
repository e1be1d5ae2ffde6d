use std::sync::Arc;

use ruma::{ServerName, UserId};
use typing_core::{Config, Result, Server};

use crate::Args;

/// Server-wide globals: configuration and server-identity access shared by
/// every service in this process.
pub struct Service {
	pub config: Config,
	server: Arc<Server>,
}

impl crate::Service for Service {
	fn build(args: Args<'_>) -> Result<Arc<impl crate::Service>> {
		Ok(Arc::new(Self {
			config: args.server.config.clone(),
			server: args.server.clone(),
		}))
	}

	fn name(&self) -> &str { crate::service::make_name(std::module_path!()) }
}

impl Service {
	#[inline]
	pub fn server_name(&self) -> &ServerName { self.config.server_name.as_ref() }

	/// Checks if `user_id` is local to us via server_name comparison.
	#[inline]
	pub fn user_is_local(&self, user_id: &UserId) -> bool { self.server_is_ours(user_id.server_name()) }

	#[inline]
	pub fn server_is_ours(&self, server_name: &ServerName) -> bool { server_name == self.config.server_name }

	#[inline]
	pub fn now_ms(&self) -> u64 { self.server.clock.now_ms() }
}
