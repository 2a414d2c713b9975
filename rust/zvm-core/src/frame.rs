//! Activation records and the dispatch loop.

use std::sync::Arc;

use crate::error::{Result, StackFrame, VmError};
use crate::procedure::{OpRef, Procedure};
use crate::registry::{Handler, Output};
use crate::state::State;
use crate::trace::TraceEvent;
use crate::value::{KvArray, Value};
use crate::vm::Machine;

/// One procedure in progress.
///
/// Frames never point at their parent. A child frame receives a copy of
/// the parent's locals when it is created and lives on the Rust call
/// stack for as long as the composite op runs.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) locals: KvArray,
    pub(crate) name: String,
    pub(crate) depth: usize,
    pub(crate) ops: Arc<[Value]>,
    /// Index of the op being dispatched. `recurse` sets it to -1 so the
    /// post-increment lands on 0.
    pub(crate) pc: isize,
    pub(crate) begins: Vec<isize>,
    pub(crate) next_params: KvArray,
}

impl Frame {
    pub(crate) fn root() -> Self {
        Self::new("root", 0, KvArray::new())
    }

    fn new(name: &str, depth: usize, locals: KvArray) -> Self {
        Self {
            locals,
            name: name.to_string(),
            depth,
            ops: Arc::from(Vec::new()),
            pc: 0,
            begins: Vec::new(),
            next_params: KvArray::new(),
        }
    }

    fn stack_frame(&self) -> StackFrame {
        StackFrame {
            frame_name: self.name.clone(),
            pc: self.pc,
        }
    }

    /// Run `ops` to completion in this frame.
    pub(crate) fn run(&mut self, machine: &mut Machine, ops: Arc<[Value]>) -> Result<()> {
        self.ops = ops;
        self.pc = 0;
        self.begins.clear();
        while let Some(index) = usize::try_from(self.pc).ok().filter(|i| *i < self.ops.len()) {
            let ops = Arc::clone(&self.ops);
            let result = OpRef::classify(&ops[index]).and_then(|op| self.step(machine, op));
            if let Err(e) = result {
                return Err(e.in_frame(self.stack_frame()));
            }
            self.pc += 1;
        }
        Ok(())
    }

    fn step(&mut self, machine: &mut Machine, op: OpRef<'_>) -> Result<()> {
        machine.trace_step(self, op.trace_name());
        let output = match op {
            OpRef::Literal(value) => Output::Push(value.clone()),
            OpRef::Invoke { name, params } => {
                let handler = machine.registry.lookup_op(name)?;
                let mut bound = std::mem::take(&mut self.next_params);
                bound.extend(OpRef::bindings(params));
                match handler {
                    Handler::Native(f) => {
                        let mut state = State::new(machine, self, name);
                        f(&mut state, bound)?
                    }
                    Handler::Procedure(procedure) => {
                        self.call(machine, name, &procedure, bound)?;
                        Output::None
                    }
                }
            }
        };
        machine.apply(output);
        Ok(())
    }

    /// Run a composite op in a child frame sharing the VM stack.
    fn call(
        &self,
        machine: &mut Machine,
        name: &str,
        procedure: &Procedure,
        bindings: KvArray,
    ) -> Result<()> {
        let depth = self.depth + 1;
        if depth > machine.max_depth {
            return Err(VmError::StackOverflow(machine.max_depth));
        }
        let mut locals = self.locals.clone();
        locals.extend(procedure.set.clone());
        locals.extend(bindings);

        let mut child = Frame::new(name, depth, locals);
        machine.emit(TraceEvent::Enter {
            frame: child.name.clone(),
            depth,
        });
        child.run(machine, Arc::clone(&procedure.run))?;
        machine.emit(TraceEvent::Exit {
            frame: child.name,
            depth,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;

    fn ops(value: Value) -> Arc<[Value]> {
        match value {
            Value::Array(items) => Arc::from(items),
            other => Arc::from(vec![other]),
        }
    }

    fn machine(registry: Registry) -> Machine {
        let mut machine = Machine::new(registry, Vec::new());
        machine.console = false;
        machine
    }

    #[test]
    fn literals_are_pushed_verbatim() {
        let mut machine = machine(Registry::new());
        let mut root = Frame::root();
        root.run(&mut machine, ops(json!([1, "two", {"three": 3}, [4]])))
            .unwrap();
        assert_eq!(machine.stack, vec![json!(1), json!("two"), json!({"three": 3}), json!([4])]);
    }

    #[test]
    fn outputs_extend_in_order() {
        let mut registry = Registry::new();
        registry.op("pair", |_, _| Ok(Output::Extend(vec![json!("a"), json!("b")])));
        registry.op("nothing", |_, _| Ok(()));
        let mut machine = machine(registry);
        let mut root = Frame::root();
        root.run(&mut machine, ops(json!([{"op": "pair"}, {"op": "nothing"}])))
            .unwrap();
        assert_eq!(machine.stack, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn unknown_op_carries_the_frame() {
        let mut machine = machine(Registry::new());
        let mut root = Frame::root();
        let err = root
            .run(&mut machine, ops(json!([1, {"op": "nope"}])))
            .unwrap_err();
        assert!(matches!(err.root(), VmError::UnknownOp(name) if name == "nope"));
        assert_eq!(
            err.frames(),
            &[StackFrame {
                frame_name: "root".into(),
                pc: 1
            }]
        );
    }

    #[test]
    fn child_frames_copy_locals_and_bind_params() {
        let mut registry = Registry::new();
        registry
            .op("seen", |state, _| Ok(Value::Object(state.locals().clone())))
            .procedure("child", &json!({"set": {"b": 2}, "run": [{"op": "seen"}]}))
            .unwrap();
        let mut machine = machine(registry);
        let mut root = Frame::root();
        root.locals.insert("a".into(), json!(1));
        root.locals.insert("b".into(), json!(0));
        root.run(&mut machine, ops(json!([{"op": "child", "c": 3}])))
            .unwrap();
        assert_eq!(machine.stack, vec![json!({"a": 1, "b": 2, "c": 3})]);
        assert_eq!(root.locals, *json!({"a": 1, "b": 0}).as_object().unwrap());
    }

    #[test]
    fn runaway_composition_overflows() {
        let mut registry = Registry::new();
        registry
            .procedure("forever", &json!({"run": [{"op": "forever"}]}))
            .unwrap();
        let mut machine = machine(registry);
        machine.max_depth = 8;
        let mut root = Frame::root();
        let err = root
            .run(&mut machine, ops(json!({"op": "forever"})))
            .unwrap_err();
        assert!(matches!(err.root(), VmError::StackOverflow(8)));
        assert_eq!(err.frames().len(), 9);
        assert_eq!(err.frames()[8].frame_name, "root");
    }
}
