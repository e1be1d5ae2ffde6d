use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

/// Cancellable handle to a scheduled [`Clock::call_later`] callback.
///
/// Cancellation is a tombstone: the handle only sets a flag that the clock
/// checks immediately before invoking the callback. It is not a guarantee
/// that the callback has not already started running.
#[derive(Clone)]
pub struct TimerHandle {
	cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
	fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn cancel(&self) { self.cancelled.store(true, Ordering::Release); }

	fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

trait ClockImpl: Send + Sync {
	fn now_ms(&self) -> u64;
	fn call_later(&self, delay_ms: u64, callback: Callback) -> TimerHandle;
}

/// Injectable monotonic time + one-shot scheduled-callback source. The
/// production implementation ([`Clock::real`]) drives callbacks off
/// `tokio::time::sleep`; tests use [`Clock::fake`] to advance time
/// deterministically via [`FakeClock::pump`].
#[derive(Clone)]
pub struct Clock(Arc<dyn ClockImpl>);

impl Clock {
	#[must_use]
	pub fn real() -> Self { Self(Arc::new(RealClock::new())) }

	/// Builds a fake clock starting at `start_ms`, returning both the
	/// injectable `Clock` handle and the concrete [`FakeClock`] used to
	/// drive it forward in tests.
	#[must_use]
	pub fn fake(start_ms: u64) -> (Self, Arc<FakeClock>) {
		let fake = Arc::new(FakeClock::new(start_ms));
		(Self(fake.clone()), fake)
	}

	#[inline]
	#[must_use]
	pub fn now_ms(&self) -> u64 { self.0.now_ms() }

	pub fn call_later(&self, delay_ms: u64, callback: impl FnOnce() + Send + 'static) -> TimerHandle {
		self.0.call_later(delay_ms, Box::new(callback))
	}
}

struct RealClock {
	runtime: tokio::runtime::Handle,
}

impl RealClock {
	fn new() -> Self {
		Self {
			runtime: tokio::runtime::Handle::current(),
		}
	}
}

impl ClockImpl for RealClock {
	fn now_ms(&self) -> u64 {
		u64::try_from(
			std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.unwrap_or_default()
				.as_millis(),
		)
		.unwrap_or(u64::MAX)
	}

	fn call_later(&self, delay_ms: u64, callback: Callback) -> TimerHandle {
		let handle = TimerHandle::new();
		let fire = handle.clone();
		self.runtime.spawn(async move {
			tokio::time::sleep(Duration::from_millis(delay_ms)).await;
			if !fire.is_cancelled() {
				callback();
			}
		});

		handle
	}
}

struct TimerEntry {
	deadline_ms: u64,
	seq: u64,
	handle: TimerHandle,
	callback: Callback,
}

/// Deterministic, synchronous stand-in for [`RealClock`]. `pump` advances
/// virtual time and fires every due, non-cancelled callback in (deadline,
/// insertion-order) order -- no actual sleeping, no tokio runtime required.
pub struct FakeClock {
	now_ms: AtomicU64,
	next_seq: AtomicU64,
	timers: Mutex<Vec<TimerEntry>>,
}

impl FakeClock {
	fn new(start_ms: u64) -> Self {
		Self {
			now_ms: AtomicU64::new(start_ms),
			next_seq: AtomicU64::new(0),
			timers: Mutex::new(Vec::new()),
		}
	}

	/// Advances the virtual clock by `delta_seconds` and synchronously runs
	/// every callback whose deadline has now been reached. Callbacks that
	/// schedule further timers which are themselves already due are handled
	/// by looping the drain until a pass fires nothing new.
	pub fn pump(&self, delta_seconds: u64) {
		self.now_ms
			.fetch_add(delta_seconds.saturating_mul(1000), Ordering::AcqRel);

		loop {
			let now = self.now_ms.load(Ordering::Acquire);
			let mut due = {
				let mut timers = self.timers.lock().expect("timers lock poisoned");
				let mut remaining = Vec::with_capacity(timers.len());
				let mut fired = Vec::new();
				for entry in timers.drain(..) {
					if entry.deadline_ms <= now {
						fired.push(entry);
					} else {
						remaining.push(entry);
					}
				}
				*timers = remaining;
				fired
			};

			if due.is_empty() {
				break;
			}

			due.sort_by_key(|e| (e.deadline_ms, e.seq));
			for entry in due {
				if !entry.handle.is_cancelled() {
					(entry.callback)();
				}
			}
		}
	}
}

impl ClockImpl for FakeClock {
	fn now_ms(&self) -> u64 { self.now_ms.load(Ordering::Acquire) }

	fn call_later(&self, delay_ms: u64, callback: Callback) -> TimerHandle {
		let handle = TimerHandle::new();
		let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
		let deadline_ms = self.now_ms().saturating_add(delay_ms);

		self.timers
			.lock()
			.expect("timers lock poisoned")
			.push(TimerEntry {
				deadline_ms,
				seq,
				handle: handle.clone(),
				callback,
			});

		handle
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	};

	use super::Clock;

	#[test]
	fn pump_fires_due_callbacks_in_deadline_order() {
		let (clock, fake) = Clock::fake(1_000_000);
		let order = Arc::new(Mutex::new(Vec::new()));

		let o1 = order.clone();
		clock.call_later(2_000, move || o1.lock().unwrap().push(1));
		let o2 = order.clone();
		clock.call_later(1_000, move || o2.lock().unwrap().push(2));

		fake.pump(3);

		assert_eq!(*order.lock().unwrap(), vec![2, 1]);
	}

	#[test]
	fn cancelled_timer_never_fires() {
		let (clock, fake) = Clock::fake(0);
		let fired = Arc::new(AtomicU32::new(0));
		let f = fired.clone();
		let handle = clock.call_later(1_000, move || {
			f.fetch_add(1, Ordering::SeqCst);
		});
		handle.cancel();
		fake.pump(5);
		assert_eq!(fired.load(Ordering::SeqCst), 0);
	}
}
