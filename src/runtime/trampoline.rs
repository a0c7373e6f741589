//! Stack-bounded execution.
//!
//! Every guarded function entry ticks a shared [`Countdown`]. Once it runs out the call
//! is abandoned: callee and arguments travel back to [`drive`] as
//! [`Interrupt::Suspend`] through the `Err` side of every intermediate `Result`, which
//! unwinds the host stack. The driving loop resets the countdown and re-applies the
//! captured call, until some call completes normally.

use super::{interp::Machine, value::Value};
use crate::error::RuntimeError;

/// A call abandoned by the guard.
pub struct Suspension<'p> {
    pub callee: Value<'p>,
    pub args: Vec<Value<'p>>,
}

/// Non-local exits out of the evaluator.
pub enum Interrupt<'p> {
    Suspend(Suspension<'p>),
    Fault(RuntimeError),
}

impl From<RuntimeError> for Interrupt<'_> {
    fn from(error: RuntimeError) -> Self {
        Interrupt::Fault(error)
    }
}

/// Outcome of one trampoline cycle.
pub enum Bounce<'p> {
    Completed(Value<'p>),
    Suspended(Suspension<'p>),
}

impl<'p> TryFrom<Result<Value<'p>, Interrupt<'p>>> for Bounce<'p> {
    type Error = RuntimeError;

    fn try_from(result: Result<Value<'p>, Interrupt<'p>>) -> Result<Self, Self::Error> {
        match result {
            Ok(value) => Ok(Bounce::Completed(value)),
            Err(Interrupt::Suspend(suspension)) => Ok(Bounce::Suspended(suspension)),
            Err(Interrupt::Fault(error)) => Err(error),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Countdown {
    budget: usize,
    remaining: isize,
}

impl Countdown {
    /// A budget of zero could never make progress and is raised to one.
    pub fn new(budget: usize) -> Self {
        let budget = budget.max(1);
        Countdown {
            budget,
            remaining: budget as isize,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Decrements the counter, returns `true` once it went negative.
    pub fn tick(&mut self) -> bool {
        self.remaining -= 1;
        self.remaining < 0
    }

    pub fn reset(&mut self) {
        self.remaining = self.budget as isize;
    }
}

/// Runs `entry` and keeps resuming suspended calls until one completes.
pub fn drive<'p>(
    machine: &mut Machine<'p>,
    entry: impl FnOnce(&mut Machine<'p>) -> Result<Value<'p>, Interrupt<'p>>,
) -> Result<Value<'p>, RuntimeError> {
    machine.countdown.reset();
    let mut bounce = Bounce::try_from(entry(machine))?;

    loop {
        match bounce {
            Bounce::Completed(value) => return Ok(value),
            Bounce::Suspended(Suspension { callee, args }) => {
                machine.stats.bounces += 1;
                log::trace!(
                    target: "trampoline",
                    "bounce {}: resuming {}",
                    machine.stats.bounces,
                    callee
                );
                machine.countdown.reset();
                bounce = Bounce::try_from(machine.apply(callee, args))?;
            }
        }
    }
}
