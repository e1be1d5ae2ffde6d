use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
	http::HeaderMap,
};
use ruma::{OwnedRoomId, OwnedUserId, UserId};
use serde::{Deserialize, Serialize};
use typing_core::Error;
use typing_service::Services;

use crate::ApiError;

/// The wire shape of a typing request body, matching the client-server API's
/// `PUT .../typing/{userId}` request (`{"typing": true, "timeout": 30000}`).
#[derive(Debug, Deserialize)]
pub struct TypingRequestBody {
	pub typing: bool,
	#[serde(default)]
	pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TypingResponseBody {}

/// `PUT /_matrix/client/v3/rooms/{roomId}/typing/{userId}`
///
/// Sets or clears the sender's typing state in a room. Access-token-derived
/// authentication sits outside this subsystem's scope; the caller is
/// expected to have been authenticated by whatever sits in front of this
/// service, which forwards the authenticated user as `X-Typing-Sender` --
/// a narrow stand-in for the missing auth-token layer.
pub async fn create_typing_event_route(
	State(services): State<Arc<Services>>, Path((room_id, target_user)): Path<(OwnedRoomId, OwnedUserId)>,
	headers: HeaderMap, Json(body): Json<TypingRequestBody>,
) -> Result<Json<TypingResponseBody>, ApiError> {
	let requester = sender_from_headers(&headers)?;

	if body.typing {
		let timeout_ms = body.timeout.unwrap_or(30_000);
		services
			.rooms
			.typing
			.started_typing(&target_user, &requester, &room_id, timeout_ms)
			.await?;
	} else {
		services
			.rooms
			.typing
			.stopped_typing(&target_user, &requester, &room_id)
			.await?;
	}

	Ok(Json(TypingResponseBody {}))
}

fn sender_from_headers(headers: &HeaderMap) -> Result<OwnedUserId, ApiError> {
	let raw = headers
		.get("x-typing-sender")
		.and_then(|value| value.to_str().ok())
		.ok_or(Error::Auth("missing authenticated sender"))?;

	UserId::parse(raw).map_err(Error::from).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use axum::http::HeaderValue;
	use ruma::{owned_room_id, owned_user_id, room_id, user_id};
	use typing_core::{Clock, Config, Server};

	use super::*;

	fn build_services() -> Arc<Services> {
		let (clock, _fake) = Clock::fake(1_000_000);
		let server = Arc::new(Server::new(Config::test_default(), clock));
		Services::build(&server).expect("services build")
	}

	fn headers_with_sender(sender: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert("x-typing-sender", HeaderValue::from_str(sender).unwrap());
		headers
	}

	#[tokio::test]
	async fn sets_typing_for_an_authenticated_member() {
		let services = build_services();
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));

		let response = create_typing_event_route(
			State(Arc::clone(&services)),
			Path((owned_room_id!("!a-room:test"), owned_user_id!("@apple:test"))),
			headers_with_sender("@apple:test"),
			Json(TypingRequestBody { typing: true, timeout: Some(5_000) }),
		)
		.await;

		assert!(response.is_ok());
		assert_eq!(
			services.rooms.typing.users_typing(room_id!("!a-room:test")),
			vec![owned_user_id!("@apple:test")]
		);
	}

	#[tokio::test]
	async fn rejects_a_request_missing_the_sender_header() {
		let services = build_services();
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));

		let response = create_typing_event_route(
			State(services),
			Path((owned_room_id!("!a-room:test"), owned_user_id!("@apple:test"))),
			HeaderMap::new(),
			Json(TypingRequestBody { typing: true, timeout: None }),
		)
		.await;

		assert!(matches!(response, Err(ApiError(Error::Auth(_)))));
	}

	#[tokio::test]
	async fn rejects_setting_another_users_typing_state() {
		let services = build_services();
		services.membership.join(room_id!("!a-room:test"), user_id!("@apple:test"));
		services.membership.join(room_id!("!a-room:test"), user_id!("@banana:test"));

		let response = create_typing_event_route(
			State(services),
			Path((owned_room_id!("!a-room:test"), owned_user_id!("@banana:test"))),
			headers_with_sender("@apple:test"),
			Json(TypingRequestBody { typing: true, timeout: None }),
		)
		.await;

		assert!(matches!(response, Err(ApiError(Error::Auth(_)))));
	}
}
