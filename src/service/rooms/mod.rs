pub mod typing;

use std::sync::Arc;

/// Aggregate of every room-scoped service. Only one member today; kept as
/// its own struct (rather than folding `typing` directly into [`super::Services`])
/// so additional room-scoped ephemeral streams have somewhere to land later,
/// the same shape the teacher's own `rooms::Service` aggregate uses.
pub struct Service {
	pub typing: Arc<typing::Service>,
}
