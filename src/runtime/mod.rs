//! Runtime subsystem modules.

mod core;
mod handle;
pub(crate) mod queue;
pub(crate) mod waker;

pub use core::{LoopState, Poller};
pub use handle::Handle;
