//! HTTP surface for the typing-notification subsystem: the client-facing
//! `PUT .../typing/{userId}` endpoint and the federation transaction
//! endpoint that carries inbound `m.typing` EDUs. Authentication (access
//! tokens) and federation request signing are out of scope here and are
//! stood in for by narrow placeholders -- see each handler's doc comment.

pub mod client;
pub mod federation;

mod error;

pub use error::ApiError;
