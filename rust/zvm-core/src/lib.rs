//! ZVM: a stack machine whose programs are JSON documents.
//!
//! A procedure document lists the ops to run; ops are either native
//! handlers registered in a [`Registry`] or other procedure documents,
//! which run in child frames that share the VM's stack.

pub mod codec;
pub mod error;
mod frame;
mod ops;
pub mod procedure;
pub mod registry;
pub mod state;
pub mod testing;
pub mod trace;
pub mod value;
pub mod vm;

pub use codec::MediaType;
pub use error::{Result, StackFrame, VmError};
pub use procedure::Procedure;
pub use registry::{Handler, Output, Params, Registry};
pub use state::State;
pub use testing::{test, TestHarness, TestOutcome};
pub use trace::{ConsoleWriter, DebugCallback, TraceEvent};
pub use value::{KvArray, Value, ValueKind};
pub use vm::VM;
