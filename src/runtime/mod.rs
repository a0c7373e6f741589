//! Execution of compiled CPS trees under the trampoline protocol.

pub mod builtins;
pub mod frame;
pub mod interp;
pub mod trampoline;
pub mod value;

pub use crate::error::RuntimeError;
pub use interp::{Machine, Stats};
pub use trampoline::{Bounce, Countdown};
pub use value::Value;
