//! The typing service registry: component A-H of the typing-notification
//! subsystem, wired together as a small set of singleton [`Service`]s.

mod service;

pub mod globals;
pub mod membership;
pub mod notifier;
pub mod rooms;
pub mod sending;

use std::sync::Arc;

pub(crate) use service::{Args, Dep, Map, MapType, require, try_get};
pub(crate) use service::Service;
use typing_core::{Result, Server};

/// Every built service, in dependency order. Dropping this drops every
/// service; services only ever reach each other indirectly through
/// [`Dep`], which upgrades a [`std::sync::Weak`] on each access, so nothing
/// here needs to be `Arc`-cyclic.
pub struct Services {
	pub globals: Arc<globals::Service>,
	pub membership: Arc<membership::Service>,
	pub notifier: Arc<notifier::Service>,
	pub sending: Arc<sending::Service>,
	pub rooms: rooms::Service,

	manager: Arc<Map>,
}

impl Services {
	/// Builds every service. Each `build` call registers its `Arc` (as a
	/// `Weak`) in `manager` before constructing the next, so a service may
	/// `Args::depend` on one built earlier even though the returned
	/// `Services` struct does not exist yet.
	pub fn build(server: &Arc<Server>) -> Result<Arc<Self>> {
		let manager: Arc<Map> = Arc::new(std::sync::RwLock::new(MapType::new()));

		macro_rules! build {
			($service:ty) => {{
				let built = <$service as Service>::build(Args {
					server,
					service: &manager,
				})?;
				manager.write().expect("locked for writing").insert(
					built.name().to_owned(),
					(Arc::downgrade(&built) as _, Arc::downgrade(&built) as _),
				);
				built
			}};
		}

		let globals = build!(globals::Service);
		let membership = build!(membership::Service);
		let notifier = build!(notifier::Service);
		let sending = build!(sending::Service);
		let typing = build!(rooms::typing::Service);

		Ok(Arc::new(Self {
			globals,
			membership,
			notifier,
			sending,
			rooms: rooms::Service { typing },
			manager,
		}))
	}

	/// Spawns every service's worker loop (today, only `sending` has one)
	/// onto the given runtime handle.
	pub fn start_workers(self: &Arc<Self>, runtime: &tokio::runtime::Handle) {
		runtime.spawn(Arc::clone(&self.sending).worker());
	}

	/// Signals every service to stop its worker loop.
	pub fn interrupt(&self) {
		self.manager
			.read()
			.expect("locked for reading")
			.values()
			.filter_map(|(service, _)| service.upgrade())
			.for_each(|service| service.interrupt());
	}
}
