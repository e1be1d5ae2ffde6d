use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use ruma::OwnedServerName;
use serde::{Deserialize, Serialize};
use tracing::debug;
use typing_service::{Services, rooms::typing::IncomingTypingEdu};

use crate::ApiError;

/// A federation transaction, trimmed to the fields this subsystem reads.
/// `origin` is trusted as given -- verifying the request signature
/// (`X-Matrix` auth) is out of scope here and is assumed to have happened
/// upstream of this handler.
#[derive(Debug, Deserialize)]
pub struct IncomingTransaction {
	pub origin: OwnedServerName,
	#[serde(default)]
	pub pdus: Vec<serde_json::Value>,
	#[serde(default)]
	pub edus: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponseBody {
	pdus: serde_json::Value,
}

/// `PUT /_matrix/federation/v1/send/{txnId}`
///
/// Applies every `m.typing` EDU in the transaction; everything else
/// (PDUs, other EDU types) is out of scope and ignored. A malformed or
/// unauthorized individual EDU is logged and dropped -- it never fails the
/// transaction, which always answers 200 once parsed.
pub async fn send_transaction_route(
	State(services): State<Arc<Services>>, Path(_txn_id): Path<String>, Json(transaction): Json<IncomingTransaction>,
) -> Result<Json<TransactionResponseBody>, ApiError> {
	for edu in &transaction.edus {
		let Some("m.typing") = edu.get("edu_type").and_then(serde_json::Value::as_str) else {
			continue;
		};

		let Some(content) = edu.get("content") else {
			debug!("dropping m.typing EDU from {}: missing content", transaction.origin);
			continue;
		};

		let parsed = match IncomingTypingEdu::from_content(content) {
			Ok(parsed) => parsed,
			Err(e) => {
				debug!("dropping malformed m.typing EDU from {}: {e}", transaction.origin);
				continue;
			},
		};

		if let Err(e) = services
			.rooms
			.typing
			.receive_federation_edu(&transaction.origin, &parsed)
			.await
		{
			debug!("dropping m.typing EDU from {}: {e}", transaction.origin);
		}
	}

	Ok(Json(TransactionResponseBody {
		pdus: serde_json::json!({}),
	}))
}
