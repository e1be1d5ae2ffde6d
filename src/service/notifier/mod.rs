use std::sync::Arc;

use ruma::{OwnedRoomId, RoomId};
use tokio::sync::broadcast;
use typing_core::{Result, trace};

use crate::Args;

/// Fan-out sink for "a new stream event exists" notifications. The core
/// state store calls this exactly once per successful mutation; narrow and
/// single-method by design, the same shape as every other push-style
/// collaborator interface in this workspace.
pub trait Notifier: Send + Sync {
	fn on_new_event(&self, stream_name: &str, new_token: u64, rooms: &[OwnedRoomId]);
}

/// Bridges the synchronous notifier call into an async broadcast channel
/// that client-facing long-poll handlers subscribe to.
pub struct Service {
	sender: broadcast::Sender<OwnedRoomId>,
}

impl crate::Service for Service {
	fn build(_args: Args<'_>) -> Result<Arc<impl crate::Service>> {
		Ok(Arc::new(Self {
			sender: broadcast::channel(100).0,
		}))
	}

	fn name(&self) -> &str { crate::service::make_name(std::module_path!()) }
}

impl Notifier for Service {
	fn on_new_event(&self, stream_name: &str, new_token: u64, rooms: &[OwnedRoomId]) {
		for room in rooms {
			if self.sender.send(room.clone()).is_err() {
				trace!("no long-poll waiters for {room} on {stream_name} at {new_token}");
			}
		}
	}
}

impl Service {
	/// Blocks (async) until a new typing event has landed for `room_id`,
	/// driving the long-poll client-facing event source.
	pub async fn wait_for_update(&self, room_id: &RoomId) {
		let mut receiver = self.sender.subscribe();
		while let Ok(next) = receiver.recv().await {
			if next == room_id {
				break;
			}
		}
	}
}
