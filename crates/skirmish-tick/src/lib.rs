//! Clock and timers for Skirmish.
//!
//! Two pieces:
//!
//! - [`TickScheduler`]: a fixed-rate clock (default 1 Hz) that the
//!   orchestrator actor awaits inside its `select!` loop.
//! - [`TimerQueue`]: tick-counted one-shot timers. Every timer is
//!   identified by a [`TimerToken`]; cancelling the token guarantees the
//!   timer never fires. Owners keep their token in a [`TimerSlot`].
//!
//! Nothing here is thread-safe on purpose: both pieces are owned by the
//! single orchestrator task, and all timer callbacks run on it.

mod scheduler;
mod timer;

pub use scheduler::{TickConfig, TickInfo, TickScheduler};
pub use timer::{TimerQueue, TimerSlot, TimerToken};
