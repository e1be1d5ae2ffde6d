use ruma::{OwnedRoomId, OwnedUserId};
use serde::Deserialize;
use typing_core::{Error, Result};

/// The `content` of an inbound `m.typing` federation EDU, already
/// extracted from the transaction's `edus` array by the API layer. A
/// missing or mistyped field is a [`Error::MalformedEdu`] -- the single
/// EDU is dropped, the rest of the transaction is unaffected.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingTypingEdu {
	pub room_id: OwnedRoomId,
	pub user_id: OwnedUserId,
	pub typing: bool,
}

impl IncomingTypingEdu {
	/// Parses an EDU's `content` object, the way the API layer hands it
	/// off after picking `edu_type == "m.typing"` out of the transaction.
	pub fn from_content(content: &serde_json::Value) -> Result<Self> {
		serde_json::from_value(content.clone())
			.map_err(|e| Error::MalformedEdu(format!("invalid m.typing content: {e}")))
	}
}
