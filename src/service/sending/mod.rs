use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use ruma::{
	OwnedServerName, OwnedUserId, RoomId, ServerName, UserId,
	api::federation::transactions::edu::{Edu, TypingContent},
};
use tokio::sync::Mutex;
use typing_core::{Result, debug, err, warn};

use crate::{Args, Dep, globals};

/// Narrow collaborator interface onto the federation wire. Retries and
/// back-off live entirely inside the implementation; the core never learns
/// about transport failures.
#[async_trait]
pub trait FederationTransport: Send + Sync {
	async fn put_json(
		&self, destination: &ServerName, path: &str, data: serde_json::Value, long_retries: bool,
		backoff_on_404: bool, try_trailing_slash_on_400: bool,
	) -> Result<(StatusCode, serde_json::Value)>;
}

/// Production transport: a thin `reqwest` wrapper. Retry/back-off policy is
/// deliberately minimal here -- this subsystem treats egress as best-effort,
/// so a single attempt per queued job is enough; the parameters are accepted
/// for interface parity with the real federation client used elsewhere.
pub struct ReqwestTransport {
	client: reqwest::Client,
}

impl Default for ReqwestTransport {
	fn default() -> Self {
		Self {
			client: reqwest::Client::new(),
		}
	}
}

#[async_trait]
impl FederationTransport for ReqwestTransport {
	async fn put_json(
		&self, destination: &ServerName, path: &str, data: serde_json::Value, _long_retries: bool,
		_backoff_on_404: bool, _try_trailing_slash_on_400: bool,
	) -> Result<(StatusCode, serde_json::Value)> {
		let url = format!("https://{destination}{path}");
		let response = self.client.put(url).json(&data).send().await?;
		let status = response.status();
		let body = response.json().await.unwrap_or(serde_json::Value::Null);

		Ok((status, body))
	}
}

struct Job {
	destination: OwnedServerName,
	path: String,
	body: serde_json::Value,
}

/// Decouples the synchronous typing-state mutation from the asynchronous
/// egress I/O: [`Service::send_typing_edu`] only ever enqueues; the worker
/// task drains the channel and performs the actual HTTP call per
/// destination, exactly the split the teacher's own dispatch services use.
pub struct Service {
	sender: loole::Sender<Job>,
	receiver: Mutex<loole::Receiver<Job>>,
	transport: std::sync::RwLock<Arc<dyn FederationTransport>>,
	services: Services,
}

struct Services {
	globals: Dep<globals::Service>,
}

impl crate::Service for Service {
	fn build(args: Args<'_>) -> Result<Arc<impl crate::Service>> {
		let (sender, receiver) = loole::unbounded();
		Ok(Arc::new(Self {
			sender,
			receiver: Mutex::new(receiver),
			transport: std::sync::RwLock::new(Arc::new(ReqwestTransport::default())),
			services: Services {
				globals: args.depend::<globals::Service>("globals"),
			},
		}))
	}

	async fn worker(self: Arc<Self>) -> Result<()> {
		let receiver = self.receiver.lock().await;
		loop {
			match receiver.recv_async().await {
				Err(_closed) => return Ok(()),
				Ok(job) => {
					let transport = Arc::clone(&*self.transport.read().expect("transport lock poisoned"));
					if let Err(e) = transport
						.put_json(&job.destination, &job.path, job.body, true, true, true)
						.await
					{
						warn!("federation egress to {} failed: {e}", job.destination);
					} else {
						debug!("federation egress to {} delivered", job.destination);
					}
				},
			}
		}
	}

	fn interrupt(&self) {
		if !self.sender.is_closed() {
			self.sender.close();
		}
	}

	fn name(&self) -> &str { crate::service::make_name(std::module_path!()) }
}

impl Service {
	/// Enqueues a typing EDU for delivery to every server in `destinations`.
	/// A no-op if federation egress is disabled in config. `destinations`
	/// should already be filtered to the room's joined remote hosts by the
	/// caller (the membership oracle is the authority on that).
	pub fn send_typing_edu(
		&self, room_id: &RoomId, user_id: &UserId, typing: bool, destinations: impl IntoIterator<Item = OwnedServerName>,
	) -> Result<()> {
		if !self.services.globals.config.send_federation {
			return Ok(());
		}

		let txn_id = self.services.globals.now_ms().to_string();
		let edu = Edu::Typing(TypingContent::new(room_id.to_owned(), user_id.to_owned(), typing));
		let transaction = serde_json::json!({
			"origin": self.services.globals.server_name(),
			"origin_server_ts": self.services.globals.now_ms(),
			"pdus": [],
			"edus": [edu],
		});
		let path = format!("/_matrix/federation/v1/send/{txn_id}");

		let whitelist = self.services.globals.config.federation_domain_whitelist.as_ref();
		for destination in destinations {
			if whitelist.is_some_and(|list| !list.contains(&destination)) {
				continue;
			}

			self.sender
				.send(Job {
					destination,
					path: path.clone(),
					body: transaction.clone(),
				})
				.map_err(|e| err!("failed to enqueue federation egress job: {e}"))?;
		}

		Ok(())
	}

	/// Swaps the transport, for tests that need to observe or fake
	/// federation egress instead of issuing real HTTP requests.
	#[cfg(test)]
	pub fn set_transport(&self, transport: Arc<dyn FederationTransport>) {
		*self.transport.write().expect("transport lock poisoned") = transport;
	}
}

/// A fake [`FederationTransport`] that records every call instead of making
/// one, shared by this module's own tests and by the rest of the workspace's
/// test suites that need to observe federation egress.
#[cfg(test)]
pub(crate) mod test_support {
	use std::sync::Mutex as StdMutex;

	use super::{Arc, FederationTransport, OwnedServerName, Result, ServerName, StatusCode, async_trait};

	#[derive(Default)]
	pub(crate) struct RecordingTransport {
		calls: StdMutex<Vec<(OwnedServerName, String)>>,
	}

	impl RecordingTransport {
		pub(crate) fn calls(&self) -> Vec<(OwnedServerName, String)> {
			self.calls.lock().expect("lock poisoned").clone()
		}
	}

	#[async_trait]
	impl FederationTransport for RecordingTransport {
		async fn put_json(
			&self, destination: &ServerName, path: &str, _data: serde_json::Value, _long_retries: bool,
			_backoff_on_404: bool, _try_trailing_slash_on_400: bool,
		) -> Result<(StatusCode, serde_json::Value)> {
			self.calls
				.lock()
				.expect("lock poisoned")
				.push((destination.to_owned(), path.to_owned()));
			Ok((StatusCode::OK, serde_json::Value::Null))
		}
	}
}

#[cfg(test)]
mod tests {
	use ruma::{room_id, server_name, user_id};

	use super::{test_support::RecordingTransport, *};

	#[tokio::test]
	async fn enqueued_job_reaches_the_transport() {
		let (clock, _fake) = typing_core::Clock::fake(0);
		let server = Arc::new(typing_core::Server::new(typing_core::Config::test_default(), clock));
		let services = crate::Services::build(&server).unwrap();

		let recorder = Arc::new(RecordingTransport::default());
		services.sending.set_transport(Arc::clone(&recorder) as _);

		let worker = tokio::spawn(Arc::clone(&services.sending).worker());

		services
			.sending
			.send_typing_edu(room_id!("!room:test"), user_id!("@alice:test"), true, vec![
				server_name!("farm").to_owned(),
			])
			.unwrap();

		for _ in 0..50 {
			if !recorder.calls().is_empty() {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}

		let calls = recorder.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, server_name!("farm"));
		assert!(calls[0].1.starts_with("/_matrix/federation/v1/send/"));

		services.sending.interrupt();
		let _ = worker.await;
	}
}
