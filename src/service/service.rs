use std::{
	any::Any,
	collections::BTreeMap,
	fmt::Write,
	ops::Deref,
	sync::{Arc, OnceLock, RwLock, Weak},
};

use async_trait::async_trait;
use typing_core::{Err, Result, Server, err, error::inspect_log, utils::split_once_infallible};

/// Abstract interface for a Service.
#[async_trait]
pub(crate) trait Service: Any + Send + Sync {
	/// Construct the service instance. Services are generally singletons, so
	/// expect this to be called once per service type.
	fn build(args: Args<'_>) -> Result<Arc<impl Service>>
	where
		Self: Sized;

	/// The service's worker loop, if it has one. The manager spawns a task
	/// and calls this after all services have been built.
	async fn worker(self: Arc<Self>) -> Result<()> { Ok(()) }

	/// Initiate graceful shutdown; the worker loop should return.
	fn interrupt(&self) {}

	/// Clear any caches or similar runtime state.
	fn clear_cache(&self) {}

	/// Memory usage report in a markdown string.
	fn memory_usage(&self, _out: &mut dyn Write) -> Result<()> { Ok(()) }

	/// Name of the service, i.e. `crate::service::make_name(std::module_path!())`.
	fn name(&self) -> &str;
}

/// Arguments passed to `Service::build` when a service is constructed.
pub(crate) struct Args<'a> {
	pub(crate) server: &'a Arc<Server>,
	pub(crate) service: &'a Arc<Map>,
}

/// A reference to a service used from within another service.
/// Circular dependencies between services require this indirection: the
/// referenced service need not exist yet at the time `depend` is called, only
/// by the time the dependency is first dereferenced.
pub(crate) struct Dep<T> {
	dep: OnceLock<Arc<T>>,
	service: Weak<Map>,
	name: &'static str,
}

pub(crate) type Map = RwLock<MapType>;
pub(crate) type MapType = BTreeMap<MapKey, MapVal>;
pub(crate) type MapVal = (Weak<dyn Service>, Weak<dyn Any + Send + Sync>);
pub(crate) type MapKey = String;

impl<T: Send + Sync + 'static> Deref for Dep<T> {
	type Target = Arc<T>;

	fn deref(&self) -> &Self::Target {
		self.dep.get_or_init(|| {
			let service = self
				.service
				.upgrade()
				.expect("services map exists for dependency initialization.");

			require::<T>(&service, self.name)
		})
	}
}

impl<'a> Args<'a> {
	/// Lazily reference another service when constructing a Service.
	pub(crate) fn depend<T: Send + Sync + 'a + 'static>(&'a self, name: &'static str) -> Dep<T> {
		Dep::<T> {
			dep: OnceLock::new(),
			service: Arc::downgrade(self.service),
			name,
		}
	}
}

/// Reference a Service by name. Panics if the Service does not exist or was
/// incorrectly cast.
pub(crate) fn require<'a, 'b, T>(map: &'b Map, name: &'a str) -> Arc<T>
where
	T: Send + Sync + 'a + 'b + 'static,
{
	try_get::<T>(map, name)
		.inspect_err(inspect_log)
		.expect("Failure to reference service required by another service.")
}

/// Reference a Service by name. Returns Err if the Service does not exist or
/// was incorrectly cast.
pub(crate) fn try_get<'a, 'b, T>(map: &'b Map, name: &'a str) -> Result<Arc<T>>
where
	T: Send + Sync + 'a + 'b + 'static,
{
	map.read()
		.expect("locked for reading")
		.get(name)
		.map_or_else(
			|| Err!("Service {name:?} does not exist or has not been built yet."),
			|(_, s)| {
				s.upgrade().map_or_else(
					|| Err!("Service {name:?} no longer exists."),
					|s| {
						s.downcast::<T>()
							.map_err(|_| err!("Service {name:?} must be correctly downcast."))
					},
				)
			},
		)
}

/// Utility for service implementations; see `Service::name()`.
#[inline]
pub(crate) fn make_name(module_path: &str) -> &str { split_once_infallible(module_path, "::").1 }
