use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, RwLock},
};

use async_trait::async_trait;
use ruma::{OwnedRoomId, OwnedServerName, OwnedUserId, RoomId, ServerName, UserId};
use typing_core::{Error, Result};

use crate::Args;

/// Narrow collaborator interface onto room membership. Persistence/SQL-backed
/// membership state is out of scope here; the only implementation this
/// workspace ships is an in-memory table populated by whatever owns the real
/// room state (in production) or by a test harness (here).
#[async_trait]
pub trait MembershipOracle: Send + Sync {
	/// Errors with [`Error::Auth`] if `user_id` is not a member of `room_id`.
	async fn check_user_in_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<()>;

	/// Whether `server_name` has at least one member in `room_id`.
	async fn check_host_in_room(&self, room_id: &RoomId, server_name: &ServerName) -> bool;

	/// The set of remote servers with at least one member in `room_id`.
	async fn joined_hosts_for_room(&self, room_id: &RoomId) -> HashSet<OwnedServerName>;

	/// The set of users (local and remote) currently joined to `room_id`.
	async fn users_in_room(&self, room_id: &RoomId) -> HashSet<OwnedUserId>;
}

#[derive(Default)]
struct Room {
	members: HashSet<OwnedUserId>,
}

/// In-memory membership table. Rooms absent from the map have no members.
pub struct Service {
	rooms: RwLock<HashMap<OwnedRoomId, Room>>,
}

impl crate::Service for Service {
	fn build(_args: Args<'_>) -> Result<Arc<impl crate::Service>> {
		Ok(Arc::new(Self {
			rooms: RwLock::new(HashMap::new()),
		}))
	}

	fn name(&self) -> &str { crate::service::make_name(std::module_path!()) }
}

impl Service {
	/// Test/bootstrap helper: adds `user_id` to `room_id`'s membership set.
	pub fn join(&self, room_id: &RoomId, user_id: &UserId) {
		self.rooms
			.write()
			.expect("rooms lock poisoned")
			.entry(room_id.to_owned())
			.or_default()
			.members
			.insert(user_id.to_owned());
	}
}

#[async_trait]
impl MembershipOracle for Service {
	async fn check_user_in_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
		let present = self
			.rooms
			.read()
			.expect("rooms lock poisoned")
			.get(room_id)
			.is_some_and(|room| room.members.contains(user_id));

		if present {
			Ok(())
		} else {
			Err(Error::Auth("user is not a member of this room"))
		}
	}

	async fn check_host_in_room(&self, room_id: &RoomId, server_name: &ServerName) -> bool {
		self.rooms
			.read()
			.expect("rooms lock poisoned")
			.get(room_id)
			.is_some_and(|room| room.members.iter().any(|u| u.server_name() == server_name))
	}

	async fn joined_hosts_for_room(&self, room_id: &RoomId) -> HashSet<OwnedServerName> {
		self.rooms
			.read()
			.expect("rooms lock poisoned")
			.get(room_id)
			.map(|room| room.members.iter().map(|u| u.server_name().to_owned()).collect())
			.unwrap_or_default()
	}

	async fn users_in_room(&self, room_id: &RoomId) -> HashSet<OwnedUserId> {
		self.rooms
			.read()
			.expect("rooms lock poisoned")
			.get(room_id)
			.map(|room| room.members.clone())
			.unwrap_or_default()
	}
}
