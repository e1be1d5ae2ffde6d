use std::sync::Arc;

use axum::{Router, response::IntoResponse, routing::put};
use http::{StatusCode, Uri};
use typing_service::Services;

pub(crate) fn build(services: Arc<Services>) -> Router {
	Router::new()
		.route(
			"/_matrix/client/v3/rooms/:room_id/typing/:user_id",
			put(typing_api::client::create_typing_event_route),
		)
		.route(
			"/_matrix/federation/v1/send/:txn_id",
			put(typing_api::federation::send_transaction_route),
		)
		.fallback(not_found)
		.with_state(services)
}

async fn not_found(_uri: Uri) -> impl IntoResponse {
	(StatusCode::NOT_FOUND, "Not Found")
}
