//! The façade handed to every callable op, getter, putter and deleter.
//!
//! A `State` borrows the running VM and the frame that dispatched the
//! current op. It exposes the shared stack, the frame's local scope and the
//! VM's global scope, and nothing about how frames are linked together.

use chrono::{TimeDelta, Utc};
use serde::de::DeserializeOwned;

use crate::error::{Result, VmError};
use crate::frame::Frame;
use crate::registry::{Handler, Params, Registry};
use crate::value::{KvArray, Value};
use crate::vm::Machine;

pub struct State<'a> {
    machine: &'a mut Machine,
    frame: &'a mut Frame,
    op: &'a str,
}

impl<'a> State<'a> {
    pub(crate) fn new(machine: &'a mut Machine, frame: &'a mut Frame, op: &'a str) -> Self {
        Self { machine, frame, op }
    }

    // -----------------------------------------------------------------------
    // Stack
    // -----------------------------------------------------------------------

    pub fn push(&mut self, value: Value) {
        self.machine.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.machine.stack.pop().ok_or(VmError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Pop `n` values, returned in stack order (the old top of stack last).
    pub fn popn(&mut self, n: usize) -> Result<Vec<Value>> {
        let available = self.machine.stack.len();
        if n > available {
            return Err(VmError::StackUnderflow {
                needed: n,
                available,
            });
        }
        Ok(self.machine.stack.split_off(available - n))
    }

    /// Pop the two operands of a binary op as `(x, y)`, `y` being the old
    /// top of stack.
    pub fn pop_pair(&mut self) -> Result<(Value, Value)> {
        let mut operands = self.popn(2)?.into_iter();
        match (operands.next(), operands.next()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(VmError::StackUnderflow {
                needed: 2,
                available: 0,
            }),
        }
    }

    /// The value `offset` places below the top of stack.
    pub fn peek(&self, offset: usize) -> Result<&Value> {
        let len = self.machine.stack.len();
        if offset >= len {
            return Err(VmError::StackUnderflow {
                needed: offset + 1,
                available: len,
            });
        }
        Ok(&self.machine.stack[len - 1 - offset])
    }

    pub fn len(&self) -> usize {
        self.machine.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machine.stack.is_empty()
    }

    pub fn stack(&self) -> &[Value] {
        &self.machine.stack
    }

    pub fn stack_mut(&mut self) -> &mut Vec<Value> {
        &mut self.machine.stack
    }

    // -----------------------------------------------------------------------
    // Local scope
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.frame.locals.get(key).ok_or_else(|| VmError::MissingVariable {
            scope: "local",
            key: key.to_string(),
        })
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.frame.locals.insert(key.to_string(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.frame.locals.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> Result<Value> {
        self.frame.locals.remove(key).ok_or_else(|| VmError::MissingVariable {
            scope: "local",
            key: key.to_string(),
        })
    }

    pub fn locals(&self) -> &KvArray {
        &self.frame.locals
    }

    // -----------------------------------------------------------------------
    // Global scope
    // -----------------------------------------------------------------------

    pub fn get_global(&self, key: &str) -> Result<&Value> {
        self.machine
            .globals
            .get(key)
            .ok_or_else(|| VmError::MissingVariable {
                scope: "global",
                key: key.to_string(),
            })
    }

    pub fn set_global(&mut self, key: &str, value: Value) {
        self.machine.globals.insert(key.to_string(), value);
    }

    pub fn has_global(&self, key: &str) -> bool {
        self.machine.globals.contains_key(key)
    }

    pub fn delete_global(&mut self, key: &str) -> Result<Value> {
        self.machine
            .globals
            .remove(key)
            .ok_or_else(|| VmError::MissingVariable {
                scope: "global",
                key: key.to_string(),
            })
    }

    pub fn globals(&self) -> &KvArray {
        &self.machine.globals
    }

    // -----------------------------------------------------------------------
    // Registry and context
    // -----------------------------------------------------------------------

    /// Look up another op's handler by name.
    pub fn op(&self, name: &str) -> Result<Handler> {
        self.machine.registry.lookup_op(name)
    }

    pub fn registry(&self) -> &Registry {
        &self.machine.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.machine.registry
    }

    /// Name of the op being dispatched.
    pub fn op_name(&self) -> &str {
        self.op
    }

    /// Nesting depth of the current frame; the root frame is 0.
    pub fn depth(&self) -> usize {
        self.frame.depth
    }

    /// Wall time since the VM was created.
    pub fn elapsed(&self) -> TimeDelta {
        Utc::now() - self.machine.started_at
    }

    /// Decode keyword parameters into a typed struct, reporting failures
    /// against the current op.
    pub fn decode<T: DeserializeOwned>(&self, params: Params) -> Result<T> {
        serde_json::from_value(Value::Object(params))
            .map_err(|e| VmError::params(self.op, e.to_string()))
    }

    /// Fail if the op was handed any parameters at all.
    pub fn no_params(&self, params: &Params) -> Result<()> {
        match params.keys().next() {
            Some(key) => Err(VmError::params(
                self.op,
                format!("unexpected parameter '{key}'"),
            )),
            None => Ok(()),
        }
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        self.frame
    }
}
