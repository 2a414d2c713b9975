//! Built-in ops and the `locals`/`globals` scope plugins.

mod arith;
mod flow;
mod format;
mod io;
mod logic;
mod scope;
mod stack;

use crate::registry::Registry;

pub(crate) fn install(registry: &mut Registry) {
    arith::install(registry);
    logic::install(registry);
    stack::install(registry);
    flow::install(registry);
    io::install(registry);
    format::install(registry);
    scope::install(registry);
}

#[cfg(test)]
pub(crate) mod testutil {
    use serde_json::Value;

    use crate::error::VmError;
    use crate::vm::VM;

    /// Run `ops` on a quiet VM seeded with `stack`.
    pub fn run(stack: Vec<Value>, ops: Value) -> Result<Vec<Value>, VmError> {
        let mut vm = VM::new().with_stack(stack).with_console(false);
        vm.exec(&serde_json::json!({ "run": ops }))?;
        Ok(vm.into_stack())
    }
}
