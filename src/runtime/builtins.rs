//! Native functions.
//!
//! Natives follow the CPS calling convention: the first argument is the continuation
//! the result is passed to. The top-level sink is the exception, it is itself a
//! continuation and only records its argument.

use super::{
    interp::Machine,
    trampoline::Interrupt,
    value::{Native, Value},
};
use crate::error::RuntimeError;

pub(crate) fn install(machine: &mut Machine<'_>, sink: &str) {
    machine.define_native("print", print);
    machine.define_native("println", println);
    machine.define_global(
        sink,
        Value::Native(Native {
            name: "sink",
            func: finish,
        }),
    );
}

fn continuation<'p>(
    name: &str,
    args: &mut std::vec::IntoIter<Value<'p>>,
) -> Result<Value<'p>, RuntimeError> {
    match args.next() {
        Some(k) if k.is_callable() => Ok(k),
        Some(other) => Err(RuntimeError::NotCallable(format!(
            "{} (continuation of {})",
            other, name
        ))),
        None => Err(RuntimeError::Malformed(format!(
            "{} called without a continuation",
            name
        ))),
    }
}

fn emit(machine: &mut Machine<'_>, text: &str) {
    if machine.echo {
        print!("{}", text);
    }
    machine.output.push_str(text);
}

fn print<'p>(machine: &mut Machine<'p>, args: Vec<Value<'p>>) -> Result<Value<'p>, Interrupt<'p>> {
    let mut args = args.into_iter();
    let k = continuation("print", &mut args)?;

    let text = args
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    emit(machine, &text);

    machine.apply(k, vec![Value::FALSE])
}

fn println<'p>(
    machine: &mut Machine<'p>,
    args: Vec<Value<'p>>,
) -> Result<Value<'p>, Interrupt<'p>> {
    let mut args = args.into_iter();
    let k = continuation("println", &mut args)?;

    let text = args
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    emit(machine, &text);
    emit(machine, "\n");

    machine.apply(k, vec![Value::FALSE])
}

fn finish<'p>(machine: &mut Machine<'p>, args: Vec<Value<'p>>) -> Result<Value<'p>, Interrupt<'p>> {
    let value = args.into_iter().next().unwrap_or(Value::FALSE);
    log::trace!(target: "trampoline", "top-level continuation received {}", value);
    machine.result = Some(value.clone());
    Ok(value)
}
