use std::fmt;

/// Builds an [`Error`] from a format string, optionally logging it at the
/// given level first. Mirrors the call-site ergonomics of `format!` while
/// keeping the log and the error message in sync.
#[macro_export]
macro_rules! err {
	(error!($($args:tt),+)) => {{
		$crate::error!($($args),+);
		$crate::Error::Err(format!($($args),+))
	}};

	($variant:ident(error!($($args:tt),+))) => {{
		$crate::error!($($args),+);
		$crate::Error::$variant(format!($($args),+))
	}};

	($variant:ident($($args:tt),+)) => {
		$crate::Error::$variant(format!($($args),+))
	};

	($string:literal $(,)? $($args:tt),*) => {
		$crate::Error::Err(format!($string, $($args),*))
	};
}

/// `Err($crate::err!(...))` in one step.
#[macro_export]
macro_rules! Err {
	($($args:tt)*) => {
		Err($crate::err!($($args)*))
	};
}

#[derive(thiserror::Error)]
pub enum Error {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	ParseIntError(#[from] std::num::ParseIntError),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
	#[error("HTTP error: {0}")]
	Http(#[from] http::Error),
	#[error("Request error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("Config error: {0}")]
	FigmentError(#[from] figment::Error),

	#[error("{0}")]
	Mxid(#[from] ruma::IdParseError),

	#[error("There was a problem with your configuration: {0}")]
	BadConfig(String),

	/// The requester is not authorized to perform the requested typing
	/// change (wrong target user, or not a member of the room).
	#[error("{0}")]
	Auth(&'static str),

	/// An inbound federation EDU was missing or mis-typed a required field.
	/// Dropped, never surfaced to the remote peer.
	#[error("malformed edu: {0}")]
	MalformedEdu(String),

	/// An inbound federation EDU claimed a user whose server does not match
	/// the transaction's origin, or whose origin is not in the room.
	#[error("unauthorized origin: {0}")]
	UnauthorizedOrigin(String),

	#[error("{0}")]
	Err(String),
}

impl Error {
	pub fn bad_config(message: &str) -> Self {
		crate::error!("BadConfig: {}", message);
		Self::BadConfig(message.to_owned())
	}

	/// Sanitizes public-facing errors that can leak sensitive information.
	pub fn sanitized_string(&self) -> String {
		match self {
			Self::Io(..) => String::from("I/O error occurred."),
			_ => self.to_string(),
		}
	}
}

impl fmt::Debug for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{self}") }
}

/// Logs any error via `tracing::error!`. Handy as a `.inspect_err()` callback.
#[inline]
pub fn inspect_log<E: fmt::Display>(error: &E) { crate::error!("{error}"); }
