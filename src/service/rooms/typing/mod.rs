use std::{
	collections::{BTreeMap, HashMap},
	sync::{Arc, Mutex, OnceLock, Weak},
};

use ruma::{OwnedRoomId, OwnedServerName, OwnedUserId, RoomId, ServerName, UserId};
use serde::Serialize;
use typing_core::{Clock, Error, Result, TimerHandle, debug, debug_info, trace};

use crate::{
	Args, Dep, globals,
	membership::{self, MembershipOracle},
	notifier::{self, Notifier},
	sending,
};

mod edu;

pub use edu::IncomingTypingEdu;

/// A single typing member's expiry.
struct MemberEntry {
	until_ms: u64,
	originated_locally: bool,
	timer: TimerHandle,
}

#[derive(Default)]
struct RoomState {
	members: BTreeMap<OwnedUserId, MemberEntry>,
}

#[derive(Default)]
struct State {
	rooms: HashMap<OwnedRoomId, RoomState>,
	last_change: HashMap<OwnedRoomId, u64>,
	current_position: u64,
}

/// The typing state machine: who is typing where, when each entry expires,
/// and the monotonic stream of changes driving the local notifier and
/// federation egress.
pub struct Service {
	state: Mutex<State>,
	clock: Clock,
	self_ref: OnceLock<Weak<Service>>,
	services: Services,
}

struct Services {
	globals: Dep<globals::Service>,
	membership: Dep<membership::Service>,
	notifier: Dep<notifier::Service>,
	sending: Dep<sending::Service>,
}

/// One materialized `m.typing` event, in the wire shape the event source
/// (§4.D) hands to long-polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct TypingEvent {
	#[serde(rename = "type")]
	pub kind: &'static str,
	pub room_id: OwnedRoomId,
	pub content: TypingEventContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingEventContent {
	pub user_ids: Vec<OwnedUserId>,
}

impl crate::Service for Service {
	fn build(args: Args<'_>) -> Result<Arc<impl crate::Service>> {
		let service = Arc::new(Self {
			state: Mutex::new(State::default()),
			clock: args.server.clock.clone(),
			self_ref: OnceLock::new(),
			services: Services {
				globals: args.depend::<globals::Service>("globals"),
				membership: args.depend::<membership::Service>("membership"),
				notifier: args.depend::<notifier::Service>("notifier"),
				sending: args.depend::<sending::Service>("sending"),
			},
		});

		service
			.self_ref
			.set(Arc::downgrade(&service))
			.unwrap_or_else(|_| unreachable!("self_ref set once during build"));

		Ok(service)
	}

	fn name(&self) -> &str { crate::service::make_name(std::module_path!()) }
}

impl Service {
	/// Marks `user` as typing in `room` until `until_ms`. A no-op if the
	/// user is already recorded with an equal or later expiry. `until_ms`
	/// at or before the current time behaves as [`Self::clear_typing`]: an
	/// immediate-expiry start is never actually inserted.
	pub fn set_typing(&self, room_id: &RoomId, user_id: &UserId, until_ms: u64, originated_locally: bool) -> u64 {
		if until_ms <= self.clock.now_ms() {
			return self
				.clear_typing(room_id, user_id, originated_locally)
				.unwrap_or_else(|| self.current_key());
		}

		let mut state = self.state.lock().expect("typing state lock poisoned");

		if let Some(room) = state.rooms.get(room_id) {
			if let Some(existing) = room.members.get(user_id) {
				if existing.until_ms >= until_ms {
					return state.current_position;
				}
			}
		}

		debug_info!("typing started {user_id} in {room_id} until {until_ms}");

		if let Some(room) = state.rooms.get_mut(room_id) {
			if let Some(old) = room.members.remove(user_id) {
				old.timer.cancel();
			}
		}

		let timer = self.schedule_expiry(room_id, user_id, until_ms);
		state
			.rooms
			.entry(room_id.to_owned())
			.or_default()
			.members
			.insert(
				user_id.to_owned(),
				MemberEntry {
					until_ms,
					originated_locally,
					timer,
				},
			);

		let position = self.bump(&mut state, room_id);
		drop(state);

		self.notify(room_id, position);
		if originated_locally {
			self.federate(room_id, user_id, true);
		}

		position
	}

	/// Removes `user`'s typing entry in `room`, if present. A no-op
	/// (returning `None`) if the user was not recorded as typing.
	pub fn clear_typing(&self, room_id: &RoomId, user_id: &UserId, originated_locally: bool) -> Option<u64> {
		let mut state = self.state.lock().expect("typing state lock poisoned");

		let entry = state.rooms.get_mut(room_id)?.members.remove(user_id)?;
		entry.timer.cancel();

		if state
			.rooms
			.get(room_id)
			.is_some_and(|room| room.members.is_empty())
		{
			state.rooms.remove(room_id);
		}

		debug_info!("typing stopped {user_id} in {room_id}");

		let position = self.bump(&mut state, room_id);
		drop(state);

		self.notify(room_id, position);
		if originated_locally {
			self.federate(room_id, user_id, false);
		}

		Some(position)
	}

	/// Snapshot of users currently typing in `room_id`, in no particular
	/// contractual order (the backing map happens to keep them sorted).
	pub fn users_typing(&self, room_id: &RoomId) -> Vec<OwnedUserId> {
		self.state
			.lock()
			.expect("typing state lock poisoned")
			.rooms
			.get(room_id)
			.map(|room| room.members.keys().cloned().collect())
			.unwrap_or_default()
	}

	/// Current stream position, the last one handed out by any mutation.
	pub fn current_key(&self) -> u64 {
		self.state.lock().expect("typing state lock poisoned").current_position
	}

	/// The subset of `room_ids` whose latest change exceeds `from_key`.
	pub fn rooms_changed_since(&self, from_key: u64, room_ids: &[OwnedRoomId]) -> Vec<OwnedRoomId> {
		let state = self.state.lock().expect("typing state lock poisoned");
		room_ids
			.iter()
			.filter(|room_id| {
				state
					.last_change
					.get(*room_id)
					.is_some_and(|&pos| pos > from_key)
			})
			.cloned()
			.collect()
	}

	/// Answers "new typing events since position `from_key` for rooms in
	/// `room_ids`" (§4.D). `user_id` and `is_guest` are accepted for
	/// interface parity with the distilled spec's signature; this
	/// subsystem does not withhold typing from guests and does not need
	/// the requesting user to materialize another user's current set.
	pub fn get_new_events(
		&self, _user_id: &UserId, from_key: u64, limit: Option<usize>, room_ids: &[OwnedRoomId], _is_guest: bool,
	) -> (Vec<TypingEvent>, u64) {
		let changed = self.rooms_changed_since(from_key, room_ids);
		if changed.is_empty() {
			return (Vec::new(), from_key);
		}

		let mut events: Vec<_> = changed
			.into_iter()
			.map(|room_id| {
				let user_ids = self.users_typing(&room_id);
				TypingEvent {
					kind: "m.typing",
					room_id,
					content: TypingEventContent { user_ids },
				}
			})
			.collect();

		if let Some(limit) = limit {
			events.truncate(limit);
		}

		(events, self.current_key())
	}

	/// Public façade (§4.H): marks `target_user` as typing in `room_id` for
	/// `timeout_ms`, after checking `requester` is allowed to speak for
	/// `target_user` and is currently a member of the room.
	pub async fn started_typing(
		&self, target_user: &UserId, requester: &UserId, room_id: &RoomId, timeout_ms: u64,
	) -> Result<u64> {
		self.authorize(target_user, requester, room_id).await?;

		let until_ms = self.clock.now_ms().saturating_add(timeout_ms);

		Ok(self.set_typing(room_id, target_user, until_ms, true))
	}

	/// Public façade (§4.H): the stopping counterpart of
	/// [`Self::started_typing`].
	pub async fn stopped_typing(&self, target_user: &UserId, requester: &UserId, room_id: &RoomId) -> Result<Option<u64>> {
		self.authorize(target_user, requester, room_id).await?;

		Ok(self.clear_typing(room_id, target_user, true))
	}

	/// Applies an inbound federation `m.typing` EDU (§4.G). Errors are
	/// returned for the caller to log and drop -- a malformed or
	/// unauthorized EDU never fails the transaction it arrived in, and
	/// dropping silently for room-membership reasons returns `Ok(())`
	/// exactly as if nothing had happened (no notification, no stream
	/// advance).
	pub async fn receive_federation_edu(&self, origin: &ServerName, edu: &IncomingTypingEdu) -> Result<()> {
		if edu.user_id.server_name() != origin {
			return Err(Error::UnauthorizedOrigin(format!(
				"typing EDU for {} claimed by origin {origin}",
				edu.user_id
			)));
		}

		if !self.services.membership.check_host_in_room(&edu.room_id, origin).await {
			debug!("dropping typing EDU from {origin}: not a member of {}", edu.room_id);
			return Ok(());
		}

		if edu.typing {
			let until_ms = self
				.clock
				.now_ms()
				.saturating_add(self.services.globals.config.remote_typing_timeout_ms);
			self.set_typing(&edu.room_id, &edu.user_id, until_ms, false);
		} else {
			self.clear_typing(&edu.room_id, &edu.user_id, false);
		}

		Ok(())
	}

	async fn authorize(&self, target_user: &UserId, requester: &UserId, room_id: &RoomId) -> Result<()> {
		if target_user != requester {
			return Err(Error::Auth("cannot set the typing state of another user"));
		}

		self.services
			.membership
			.check_user_in_room(room_id, requester)
			.await
	}

	async fn remote_destinations(&self, room_id: &RoomId) -> Vec<OwnedServerName> {
		self.services
			.membership
			.joined_hosts_for_room(room_id)
			.await
			.into_iter()
			.filter(|server| !self.services.globals.server_is_ours(server))
			.collect()
	}

	/// Allocates the next stream position, held as part of this store's own
	/// state rather than a freestanding counter: it only has meaning paired
	/// with the mutation it describes, and this is invoked from inside the
	/// same lock guard as that mutation.
	fn bump(&self, state: &mut State, room_id: &RoomId) -> u64 {
		state.current_position += 1;
		let position = state.current_position;
		state.last_change.insert(room_id.to_owned(), position);
		position
	}

	fn notify(&self, room_id: &RoomId, position: u64) {
		self.services
			.notifier
			.on_new_event("typing_key", position, std::slice::from_ref(&room_id.to_owned()));
	}

	/// Resolves the room's current remote membership and hands the EDU off
	/// to the sending worker, fresh on every call -- never from a cached
	/// snapshot taken when the member started typing. Runs as a detached
	/// task since the caller (a `set_typing`/`clear_typing` critical
	/// section) is synchronous and the membership oracle is not.
	fn federate(&self, room_id: &RoomId, user_id: &UserId, typing: bool) {
		if !self.services.globals.config.send_federation {
			return;
		}

		let weak = self
			.self_ref
			.get()
			.cloned()
			.expect("self_ref set during build");
		let room_id = room_id.to_owned();
		let user_id = user_id.to_owned();

		tokio::spawn(async move {
			let Some(service) = weak.upgrade() else { return };
			let destinations = service.remote_destinations(&room_id).await;
			if destinations.is_empty() {
				return;
			}

			if let Err(e) = service
				.services
				.sending
				.send_typing_edu(&room_id, &user_id, typing, destinations)
			{
				trace!("failed to enqueue typing federation for {room_id}: {e}");
			}
		});
	}

	fn schedule_expiry(&self, room_id: &RoomId, user_id: &UserId, until_ms: u64) -> TimerHandle {
		let now = self.clock.now_ms();
		let delay_ms = until_ms.saturating_sub(now);
		let room_id = room_id.to_owned();
		let user_id = user_id.to_owned();
		let weak = self
			.self_ref
			.get()
			.cloned()
			.expect("self_ref set during build");

		self.clock.call_later(delay_ms, move || {
			if let Some(service) = weak.upgrade() {
				service.clear_typing(&room_id, &user_id, false_if_not_local(&service, &room_id, &user_id));
			}
		})
	}
}

/// The expiry timer fires from a plain closure with no access to the entry
/// it is tied to (it was consumed into the map already); re-read whether
/// this was a locally-originated entry right before clearing it so the
/// paired stop-EDU only goes out when the original start did.
fn false_if_not_local(service: &Service, room_id: &RoomId, user_id: &UserId) -> bool {
	service
		.state
		.lock()
		.expect("typing state lock poisoned")
		.rooms
		.get(room_id)
		.and_then(|room| room.members.get(user_id))
		.map(|entry| entry.originated_locally)
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, time::Duration};

	use ruma::{owned_room_id, owned_server_name, owned_user_id, room_id, server_name, user_id};
	use typing_core::{Clock, Config, Server};

	use super::*;
	use crate::Services;

	fn build_services(clock: Clock) -> Arc<Services> {
		let server = Arc::new(Server::new(Config::test_default(), clock));
		Services::build(&server).expect("services build")
	}

	#[tokio::test]
	async fn local_start_advances_stream_and_notifies() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));
		services.membership.join(room_id!("!a-room:test"), user_id!("@banana:test"));

		let waiter = tokio::spawn({
			let notifier = Arc::clone(&services.notifier);
			async move { notifier.wait_for_update(room_id!("!a-room:test")).await }
		});
		tokio::task::yield_now().await;

		let position = services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 20_000)
			.await
			.expect("started_typing");

		tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.expect("notifier fired")
			.expect("waiter task");

		assert_eq!(position, 1);
		assert_eq!(services.rooms.typing.current_key(), 1);

		let (events, key) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			0,
			None,
			&[owned_room_id!("!a-room:test")],
			false,
		);
		assert_eq!(key, 1);
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].room_id, owned_room_id!("!a-room:test"));
		assert_eq!(events[0].content.user_ids, vec![owned_user_id!("@apple:test")]);
	}

	#[tokio::test]
	async fn local_start_enqueues_federation_egress() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));
		services.membership.join(room_id!("!a-room:test"), user_id!("@onion:farm"));

		let recorder = Arc::new(crate::sending::test_support::RecordingTransport::default());
		services.sending.set_transport(Arc::clone(&recorder) as _);
		let worker = tokio::spawn(Arc::clone(&services.sending).worker());

		services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 20_000)
			.await
			.expect("started_typing");

		for _ in 0..50 {
			if !recorder.calls().is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		let calls = recorder.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, server_name!("farm"));
		assert_eq!(calls[0].1, "/_matrix/federation/v1/send/1000000");

		services.sending.interrupt();
		let _ = worker.await;
	}

	#[tokio::test]
	async fn remote_receive_accepted_advances_local_stream() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@onion:farm"));

		let edu = IncomingTypingEdu {
			room_id: owned_room_id!("!a-room:test"),
			user_id: owned_user_id!("@onion:farm"),
			typing: true,
		};

		services
			.rooms
			.typing
			.receive_federation_edu(server_name!("farm"), &edu)
			.await
			.expect("receive_federation_edu");

		assert_eq!(services.rooms.typing.current_key(), 1);
		let (events, _) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			0,
			None,
			&[owned_room_id!("!a-room:test")],
			false,
		);
		assert_eq!(events[0].content.user_ids, vec![owned_user_id!("@onion:farm")]);
	}

	#[tokio::test]
	async fn remote_receive_for_room_host_not_in_is_dropped() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		// `farm` has no members in "another-room": the membership oracle has no
		// entry for it at all.

		let edu = IncomingTypingEdu {
			room_id: owned_room_id!("!another-room:test"),
			user_id: owned_user_id!("@onion:farm"),
			typing: true,
		};

		services
			.rooms
			.typing
			.receive_federation_edu(server_name!("farm"), &edu)
			.await
			.expect("receive_federation_edu");

		assert_eq!(services.rooms.typing.current_key(), 0);
		let (events, key) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			0,
			None,
			&[owned_room_id!("!another-room:test")],
			false,
		);
		assert!(events.is_empty());
		assert_eq!(key, 0);
	}

	#[tokio::test]
	async fn stop_with_federation_enqueues_typing_false() {
		let (clock, fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));
		services.membership.join(room_id!("!a-room:test"), user_id!("@onion:farm"));

		let recorder = Arc::new(crate::sending::test_support::RecordingTransport::default());
		services.sending.set_transport(Arc::clone(&recorder) as _);
		let worker = tokio::spawn(Arc::clone(&services.sending).worker());

		services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 2_000)
			.await
			.expect("started_typing");

		let position = services
			.rooms
			.typing
			.stopped_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"))
			.await
			.expect("stopped_typing")
			.expect("was typing");
		assert_eq!(position, 2);

		for _ in 0..50 {
			if recorder.calls().len() >= 2 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		let calls = recorder.calls();
		assert_eq!(calls.len(), 2);

		let (events, _) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			1,
			None,
			&[owned_room_id!("!a-room:test")],
			false,
		);
		assert!(events[0].content.user_ids.is_empty());

		services.sending.interrupt();
		let _ = worker.await;
		drop(fake);
	}

	#[tokio::test]
	async fn expiry_round_trip_allows_restart() {
		let (clock, fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));

		let position = services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 10_000)
			.await
			.expect("started_typing");
		assert_eq!(position, 1);

		fake.pump(16);

		assert_eq!(services.rooms.typing.current_key(), 2);
		let (events, _) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			1,
			None,
			&[owned_room_id!("!a-room:test")],
			false,
		);
		assert!(events[0].content.user_ids.is_empty());

		let position = services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 10_000)
			.await
			.expect("started_typing");
		assert_eq!(position, 3);

		let (events, _) = services.rooms.typing.get_new_events(
			user_id!("@apple:test"),
			2,
			None,
			&[owned_room_id!("!a-room:test")],
			false,
		);
		assert_eq!(events[0].content.user_ids, vec![owned_user_id!("@apple:test")]);
	}

	#[tokio::test]
	async fn set_typing_with_past_deadline_behaves_as_clear() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));

		let position = services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 0)
			.await
			.expect("started_typing");

		assert_eq!(position, 0);
		assert_eq!(services.rooms.typing.current_key(), 0);
		assert!(services.rooms.typing.users_typing(room_id!("!a-room:test")).is_empty());
	}

	#[tokio::test]
	async fn stopping_federates_to_hosts_joined_after_the_start() {
		let (clock, _fake) = Clock::fake(1_000_000);
		let services = build_services(clock);
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));

		let recorder = Arc::new(crate::sending::test_support::RecordingTransport::default());
		services.sending.set_transport(Arc::clone(&recorder) as _);
		let worker = tokio::spawn(Arc::clone(&services.sending).worker());

		services
			.rooms
			.typing
			.started_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"), 20_000)
			.await
			.expect("started_typing");

		// A host joins the room only after the typing start was egressed --
		// nothing to deliver to yet, since it wasn't a member at send time.
		services.membership.join(room_id!("!a-room:test"), user_id!("@onion:farm"));

		services
			.rooms
			.typing
			.stopped_typing(user_id!("@apple:test"), user_id!("@apple:test"), room_id!("!a-room:test"))
			.await
			.expect("stopped_typing");

		for _ in 0..50 {
			if !recorder.calls().is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		let calls = recorder.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, server_name!("farm"));

		services.sending.interrupt();
		let _ = worker.await;
	}
}
